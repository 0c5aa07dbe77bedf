use std::path::Path;

use meterbook_core::validate::{meter_value, reading_date, suspicious_drop};

use crate::commands::common::{format_value, open_store, parse_meter, today};
use crate::error::CliError;

pub async fn run_add(
    meter: &str,
    raw_value: &str,
    raw_date: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let meter_type = parse_meter(meter)?;
    let value = meter_value(meter_type, raw_value)?;
    let today = today();
    let date = raw_date.map_or(Ok(today), |raw| reading_date(raw, today))?;

    let store = open_store(db_path)?;
    if let Some(previous) = store.readings(meter_type).await.first() {
        if suspicious_drop(previous.value, value) {
            eprintln!(
                "Warning: {} is much lower than the previous {meter_type} reading ({} on {})",
                format_value(value),
                format_value(previous.value),
                previous.date
            );
        }
    }

    let reading = store.add_reading(meter_type, value, date).await?;
    println!("{}", reading.id);
    Ok(())
}
