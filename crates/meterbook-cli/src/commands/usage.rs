use std::path::Path;

use meterbook_core::consumption::{cost_report, usage};

use crate::commands::common::{format_value, open_store, parse_meter};
use crate::error::CliError;

pub async fn run_usage(meter: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let meter_type = parse_meter(meter)?;
    let store = open_store(db_path)?;
    let periods = usage(&store.snapshot().await, meter_type);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&periods)?);
        return Ok(());
    }

    if periods.is_empty() {
        println!("Need at least two {meter_type} readings.");
    }
    for period in &periods {
        println!(
            "{} -> {}  {:>12} -> {:<12}  {:+}",
            period.from,
            period.to,
            format_value(period.previous),
            format_value(period.current),
            period.delta
        );
    }
    Ok(())
}

pub async fn run_cost(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let report = cost_report(&store.snapshot().await);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in &report.lines {
        let consumption = line.consumption.map_or_else(|| "-".to_string(), format_value);
        let price = line.unit_price.map_or_else(|| "-".to_string(), format_value);
        let cost = line.cost.map_or_else(|| "-".to_string(), format_value);
        println!(
            "{:<13}  {consumption:>10} x {price:<8} = {cost}",
            line.meter_type.as_str()
        );
    }
    println!("{:<13}  {}", "total", format_value(report.total));
    Ok(())
}
