use std::path::Path;

use crate::commands::common::{
    normalize_reading_identifier, open_store, parse_meter, resolve_reading_id,
};
use crate::error::CliError;

pub async fn run_delete(meter: &str, id: &str, db_path: &Path) -> Result<(), CliError> {
    let meter_type = parse_meter(meter)?;
    let normalized_id = normalize_reading_identifier(id)?;
    let store = open_store(db_path)?;
    let readings = store.readings(meter_type).await;
    let reading_id = resolve_reading_id(&readings, &normalized_id)?;

    store.delete_reading(meter_type, &reading_id).await?;
    println!("{reading_id}");
    Ok(())
}
