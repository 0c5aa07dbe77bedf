//! Shared reading export helpers for all clients.

use std::fmt::Write as _;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{MeterType, Reading, Snapshot};

/// Export output format shared by all clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

/// Serializable reading representation used in exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReading {
    pub id: String,
    pub meter_type: MeterType,
    pub date: NaiveDate,
    pub value: f64,
    pub origin_device: String,
}

impl From<&Reading> for ExportReading {
    fn from(reading: &Reading) -> Self {
        Self {
            id: reading.id.to_string(),
            meter_type: reading.meter_type,
            date: reading.date,
            value: reading.value,
            origin_device: reading.origin_device.to_string(),
        }
    }
}

/// Live readings dated within `from..=to`, grouped by meter type in meter
/// order and oldest first within a meter.
#[must_use]
pub fn readings_in_range(snapshot: &Snapshot, from: NaiveDate, to: NaiveDate) -> Vec<ExportReading> {
    MeterType::ALL
        .into_iter()
        .flat_map(|meter_type| {
            let mut readings = snapshot
                .display(meter_type)
                .into_iter()
                .filter(|reading| (from..=to).contains(&reading.date))
                .map(ExportReading::from)
                .collect::<Vec<_>>();
            readings.reverse();
            readings
        })
        .collect()
}

/// Render readings as pretty-printed JSON.
pub fn render_json_export(readings: &[ExportReading]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(readings)
}

/// Render readings as CSV with a header row.
#[must_use]
pub fn render_csv_export(readings: &[ExportReading]) -> String {
    let mut output = String::from("meter_type,date,value,id,origin_device\n");
    for reading in readings {
        let _ = writeln!(
            output,
            "{},{},{},{},{}",
            reading.meter_type,
            reading.date,
            reading.value,
            csv_field(&reading.id),
            csv_field(&reading.origin_device)
        );
    }
    output
}

/// Render readings based on selected export format.
pub fn render_export(readings: &[ExportReading], format: ExportFormat) -> serde_json::Result<String> {
    match format {
        ExportFormat::Json => render_json_export(readings),
        ExportFormat::Csv => Ok(render_csv_export(readings)),
    }
}

/// Build a deterministic default file name for export flows.
#[must_use]
pub fn suggested_export_file_name(format: ExportFormat, from: NaiveDate, to: NaiveDate) -> String {
    format!("meterbook-{from}-{to}.{}", format.extension())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceId, ReadingId};
    use pretty_assertions::assert_eq;

    fn date(raw: &str) -> NaiveDate {
        raw.parse().unwrap()
    }

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::default();
        let entries = [
            (MeterType::Electric, "e1", 4100.5, "2024-01-05", false),
            (MeterType::Electric, "e2", 4180.0, "2024-02-05", false),
            (MeterType::Gas, "g1", 120.0, "2024-02-01", false),
            (MeterType::Gas, "g2", 125.0, "2024-02-10", true),
            (MeterType::WaterBath, "w1", 10.0, "2023-12-20", false),
        ];
        for (meter_type, id, value, on, deleted) in entries {
            snapshot.series_mut(meter_type).upsert(Reading {
                id: ReadingId::from(id),
                meter_type,
                value,
                date: date(on),
                captured_at: 1,
                origin_device: DeviceId::from("phone"),
                last_modified: 1,
                deleted,
            });
        }
        snapshot
    }

    #[test]
    fn readings_in_range_filters_dates_and_tombstones() {
        let rows = readings_in_range(&sample(), date("2024-01-01"), date("2024-02-05"));
        let ids = rows.iter().map(|row| row.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["g1", "e1", "e2"]);
    }

    #[test]
    fn render_csv_export_writes_header_and_rows() {
        let rows = readings_in_range(&sample(), date("2024-01-01"), date("2024-01-31"));
        assert_eq!(
            render_csv_export(&rows),
            "meter_type,date,value,id,origin_device\nelectric,2024-01-05,4100.5,e1,phone\n"
        );
    }

    #[test]
    fn render_json_export_uses_camel_case() {
        let rows = readings_in_range(&sample(), date("2023-12-01"), date("2023-12-31"));
        let rendered = render_export(&rows, ExportFormat::Json).unwrap();
        assert!(rendered.contains("\"meterType\": \"waterBath\""));
        assert!(rendered.contains("\"originDevice\": \"phone\""));
    }

    #[test]
    fn csv_field_quotes_separators() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn suggested_export_file_name_uses_format_extension() {
        assert_eq!(
            suggested_export_file_name(ExportFormat::Csv, date("2024-01-01"), date("2024-01-31")),
            "meterbook-2024-01-01-2024-01-31.csv"
        );
    }
}
