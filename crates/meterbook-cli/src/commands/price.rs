use std::collections::BTreeMap;
use std::path::Path;

use meterbook_core::PriceField;

use crate::commands::common::{open_store, parse_price};
use crate::error::CliError;

pub async fn run_price_show(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let snapshot = store.snapshot().await;

    if as_json {
        let prices = snapshot
            .prices
            .iter()
            .map(|(field, price)| (field.as_str(), price.value))
            .collect::<BTreeMap<_, _>>();
        println!("{}", serde_json::to_string_pretty(&prices)?);
        return Ok(());
    }

    for field in PriceField::ALL {
        match snapshot.prices.value(field) {
            Some(value) => println!("{:<9}  {value}", field.as_str()),
            None => println!("{:<9}  -", field.as_str()),
        }
    }
    Ok(())
}

pub async fn run_price_set(field: &str, raw_value: &str, db_path: &Path) -> Result<(), CliError> {
    let field = field.parse::<PriceField>()?;
    let value = parse_price(raw_value)?;

    let store = open_store(db_path)?;
    store.update_price(field, value).await?;
    println!("{field} = {value}");
    Ok(())
}
