use std::collections::BTreeMap;
use std::path::Path;

use meterbook_core::CarField;

use crate::commands::common::{format_sync_timestamp, open_store, parse_car_value};
use crate::error::CliError;

pub async fn run_car_show(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let snapshot = store.snapshot().await;

    if as_json {
        let documents = snapshot
            .car_documents
            .iter()
            .map(|(field, document)| (field.as_str(), document.value))
            .collect::<BTreeMap<_, _>>();
        println!("{}", serde_json::to_string_pretty(&documents)?);
        return Ok(());
    }

    for field in CarField::ALL {
        match snapshot.car_documents.get(field) {
            Some(document) => println!(
                "{:<12}  {:<12}  updated {}",
                field.as_str(),
                document.value.to_string(),
                format_sync_timestamp(document.last_modified)
            ),
            None => println!("{:<12}  -", field.as_str()),
        }
    }
    Ok(())
}

pub async fn run_car_set(field: &str, raw_value: &str, db_path: &Path) -> Result<(), CliError> {
    let field = field.parse::<CarField>()?;
    let value = parse_car_value(field, raw_value)?;

    let store = open_store(db_path)?;
    store.update_car_document(field, value).await?;
    println!("{field} = {value}");
    Ok(())
}
