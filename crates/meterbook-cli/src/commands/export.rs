use std::path::Path;

use chrono::NaiveDate;
use meterbook_core::export::{self, readings_in_range, render_export};
use meterbook_core::store::parse_iso_date;

use crate::cli::ExportFormat;
use crate::commands::common::{open_store, parse_date_or_today};
use crate::error::CliError;

pub async fn run_export(
    from: Option<&str>,
    to: Option<&str>,
    format: ExportFormat,
    output_path: Option<&Path>,
    db_path: &Path,
) -> Result<(), CliError> {
    let from = from.map_or(Ok(NaiveDate::MIN), parse_iso_date)?;
    let to = parse_date_or_today(to)?;
    if from > to {
        return Err(CliError::Config(format!(
            "--from ({from}) must not be after --to ({to})"
        )));
    }

    let store = open_store(db_path)?;
    let readings = readings_in_range(&store.snapshot().await, from, to);
    let rendered = render_export(&readings, export_format(format))?;

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}

pub const fn export_format(format: ExportFormat) -> export::ExportFormat {
    match format {
        ExportFormat::Json => export::ExportFormat::Json,
        ExportFormat::Csv => export::ExportFormat::Csv,
    }
}
