use std::path::Path;

use crate::commands::common::{
    format_reading_lines, open_store, parse_meter, reading_to_list_item, ReadingListItem,
};
use crate::error::CliError;

pub async fn run_list(
    meter: &str,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let meter_type = parse_meter(meter)?;
    let store = open_store(db_path)?;
    let mut readings = store.readings(meter_type).await;
    readings.truncate(limit);

    if as_json {
        let json_items = readings
            .iter()
            .map(reading_to_list_item)
            .collect::<Vec<ReadingListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if readings.is_empty() {
        println!("No {meter_type} readings yet.");
    } else {
        for line in format_reading_lines(&readings) {
            println!("{line}");
        }
    }

    Ok(())
}
