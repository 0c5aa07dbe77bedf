use std::env;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use meterbook_core::config::SyncSettings;
use meterbook_core::db::AnomalyRecord;
use meterbook_core::store::parse_iso_date;
use meterbook_core::{CarField, CarValue, MeterType, Reading, ReadingId, StoreHandle};
use serde::Serialize;

use crate::error::CliError;

const SHORT_ID_LEN: usize = 13;

#[derive(Debug, Serialize)]
pub struct ReadingListItem {
    pub id: String,
    pub meter_type: String,
    pub date: String,
    pub value: f64,
    pub origin_device: String,
    pub last_modified: i64,
    pub last_modified_iso: String,
}

#[derive(Debug, Serialize)]
pub struct AnomalyItem {
    pub id: i64,
    pub meter_type: Option<String>,
    pub reading_id: Option<String>,
    pub field: Option<String>,
    pub kind: String,
    pub recorded_at: i64,
    pub recorded_at_iso: String,
}

pub fn open_store(db_path: &Path) -> Result<StoreHandle, CliError> {
    tracing::debug!("Opening local store at {}", db_path.display());
    Ok(StoreHandle::open_path(db_path)?)
}

/// Sync settings from the file at `path`, overridden by `METERBOOK_*` variables.
pub fn load_settings(path: &Path) -> Result<SyncSettings, CliError> {
    Ok(SyncSettings::load(path)?
        .with_env_overrides()
        .normalized()?)
}

pub fn parse_meter(raw: &str) -> Result<MeterType, CliError> {
    Ok(raw.parse::<MeterType>()?)
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn parse_date_or_today(raw: Option<&str>) -> Result<NaiveDate, CliError> {
    raw.map_or_else(|| Ok(today()), |raw| Ok(parse_iso_date(raw)?))
}

pub fn normalize_reading_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyReadingId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Find a reading by full id or unique id prefix.
pub fn resolve_reading_id(readings: &[Reading], query: &str) -> Result<ReadingId, CliError> {
    if let Some(reading) = readings.iter().find(|reading| reading.id.as_str() == query) {
        return Ok(reading.id.clone());
    }

    let matching = readings
        .iter()
        .filter(|reading| reading.id.as_str().starts_with(query))
        .collect::<Vec<_>>();

    match matching.as_slice() {
        [] => Err(CliError::ReadingNotFound(query.to_string())),
        [reading] => Ok(reading.id.clone()),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|reading| short_id(&reading.id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousReadingId(format!(
                "Reading ID prefix '{query}' is ambiguous. Matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &ReadingId) -> String {
    id.as_str().chars().take(SHORT_ID_LEN).collect()
}

pub fn format_reading_lines(readings: &[Reading]) -> Vec<String> {
    readings
        .iter()
        .map(|reading| {
            let device = reading.origin_device.as_str().chars().take(8).collect::<String>();
            format!(
                "{:<13}  {}  {:>12}  {device}",
                short_id(&reading.id),
                reading.date,
                format_value(reading.value)
            )
        })
        .collect()
}

pub fn reading_to_list_item(reading: &Reading) -> ReadingListItem {
    ReadingListItem {
        id: reading.id.to_string(),
        meter_type: reading.meter_type.to_string(),
        date: reading.date.to_string(),
        value: reading.value,
        origin_device: reading.origin_device.to_string(),
        last_modified: reading.last_modified,
        last_modified_iso: format_sync_timestamp(reading.last_modified),
    }
}

pub fn anomaly_to_item(record: &AnomalyRecord) -> AnomalyItem {
    AnomalyItem {
        id: record.id,
        meter_type: record.meter_type.clone(),
        reading_id: record.reading_id.clone(),
        field: record.field.clone(),
        kind: record.kind.clone(),
        recorded_at: record.recorded_at,
        recorded_at_iso: format_sync_timestamp(record.recorded_at),
    }
}

pub fn format_anomaly_lines(records: &[AnomalyRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            let at = format_sync_timestamp(record.recorded_at);
            if let Some(field) = &record.field {
                return format!("{at}  field={field}  {}", record.kind);
            }
            format!(
                "{at}  meter={}  reading={}  {}",
                record.meter_type.as_deref().unwrap_or("-"),
                record.reading_id.as_deref().unwrap_or("-"),
                record.kind
            )
        })
        .collect()
}

/// Two decimals at most, without trailing zeros.
pub fn format_value(value: f64) -> String {
    let rendered = format!("{value:.2}");
    rendered
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    if timestamp_ms <= 0 {
        return "never".to_string();
    }
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("METERBOOK_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("meterbook")
        .join("meterbook.db")
}

pub fn resolve_settings_path(cli_config_path: Option<PathBuf>) -> PathBuf {
    cli_config_path
        .or_else(|| env::var_os("METERBOOK_CONFIG_PATH").map(PathBuf::from))
        .unwrap_or_else(default_settings_path)
}

pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("meterbook")
        .join("sync.json")
}

/// Parse a car document value; odometer fields take kilometers, the rest a date.
pub fn parse_car_value(field: CarField, raw: &str) -> Result<CarValue, CliError> {
    let raw = raw.trim();
    if field.takes_kilometers() {
        let kilometers = raw
            .replace(['.', ' ', '_'], "")
            .parse::<u32>()
            .map_err(|_| {
                CliError::Core(meterbook_core::Error::Validation(format!(
                    "'{raw}' is not a kilometer count"
                )))
            })?;
        Ok(CarValue::Kilometers(kilometers))
    } else {
        Ok(CarValue::Date(parse_iso_date(raw)?))
    }
}

/// Parse a unit price; `.` or `,` as decimal separator.
pub fn parse_price(raw: &str) -> Result<f64, CliError> {
    let raw = raw.trim();
    raw.replace(',', ".").parse::<f64>().map_err(|_| {
        CliError::Core(meterbook_core::Error::Validation(format!(
            "'{raw}' is not a price"
        )))
    })
}
