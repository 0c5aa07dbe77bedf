use std::path::Path;

use meterbook_core::evaluate;

use crate::commands::common::{open_store, parse_date_or_today};
use crate::error::CliError;

pub async fn run_reminders(
    raw_date: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let today = parse_date_or_today(raw_date)?;
    let store = open_store(db_path)?;
    let reminders = evaluate(&store.snapshot().await, today);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&reminders)?);
    } else if reminders.is_empty() {
        println!("Nothing due.");
    } else {
        for reminder in &reminders {
            println!("{reminder}");
        }
    }
    Ok(())
}
