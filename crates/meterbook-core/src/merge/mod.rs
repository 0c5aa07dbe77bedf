//! Snapshot reconciliation.
//!
//! Merges a local and a remote [`Snapshot`] into one snapshot both devices
//! converge to after exchanging it. Readings are reconciled per id with
//! last-write-wins over a total order (see [`Reading::precedence`]), so the
//! merge is commutative, idempotent and associative. Car documents and prices
//! are reconciled per field; an exact timestamp tie keeps the local value.
//!
//! Malformed readings, car documents and prices never abort a merge. They are
//! dropped, logged and returned as [`MergeAnomaly`] records.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{
    CarDocument, CarDocuments, CarField, CarValue, DeviceId, MeterSeries, MeterType, Price,
    PriceField, PriceTable, Reading, ReadingId, Snapshot,
};


/// Latest stamp accepted from any device (9999-12-31T23:59:59.999Z).
pub const MAX_TIMESTAMP_MS: i64 = 253_402_300_799_999;

/// Why a record was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "detail")]
pub enum AnomalyKind {
    MissingId,
    MissingLastModified,
    TimestampOutOfRange(i64),
    InvalidValue,
    WrongSeries { found: MeterType },
    UnknownMeterType(String),
    Undecodable(String),
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingId => f.write_str("missing id"),
            Self::MissingLastModified => f.write_str("missing lastModified"),
            Self::TimestampOutOfRange(stamp) => write!(f, "lastModified {stamp} is out of range"),
            Self::InvalidValue => f.write_str("value is negative or not a number"),
            Self::WrongSeries { found } => write!(f, "filed under the wrong meter ({found})"),
            Self::UnknownMeterType(name) => write!(f, "unknown meter type '{name}'"),
            Self::Undecodable(reason) => write!(f, "undecodable record: {reason}"),
        }
    }
}

/// Per-field record outside the reading series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "section", content = "name")]
pub enum RecordField {
    CarDocument(CarField),
    Price(PriceField),
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CarDocument(field) => write!(f, "carDocuments.{field}"),
            Self::Price(field) => write!(f, "prices.{field}"),
        }
    }
}

/// A malformed record skipped during decoding or merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeAnomaly {
    /// Series the record was found in, when known
    pub meter_type: Option<MeterType>,
    pub reading_id: Option<ReadingId>,
    /// Set for car document and price records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<RecordField>,
    pub kind: AnomalyKind,
}

impl MergeAnomaly {
    #[must_use]
    pub const fn for_field(field: RecordField, kind: AnomalyKind) -> Self {
        Self {
            meter_type: None,
            reading_id: None,
            field: Some(field),
            kind,
        }
    }
}

impl fmt::Display for MergeAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(field) = self.field {
            return write!(f, "{field}: {}", self.kind);
        }
        let meter = self
            .meter_type
            .map_or_else(|| "?".to_string(), |meter| meter.to_string());
        let id = self
            .reading_id
            .as_ref()
            .map_or("?", ReadingId::as_str);
        write!(f, "{meter}/{id}: {}", self.kind)
    }
}

/// Result of [`merge`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergeOutcome {
    pub snapshot: Snapshot,
    pub anomalies: Vec<MergeAnomaly>,
}

/// Merge two snapshots.
///
/// Never fails: malformed readings are dropped and reported in
/// [`MergeOutcome::anomalies`].
#[must_use]
pub fn merge(local: &Snapshot, remote: &Snapshot) -> MergeOutcome {
    let mut anomalies = Vec::new();

    let mut readings = BTreeMap::new();
    let meter_types = local
        .readings
        .keys()
        .chain(remote.readings.keys())
        .copied()
        .collect::<BTreeSet<_>>();

    for meter_type in meter_types {
        let series = merge_series(
            meter_type,
            local.readings.get(&meter_type),
            remote.readings.get(&meter_type),
            &mut anomalies,
        );
        // Empty series are kept; merging a snapshot with itself is exact.
        readings.insert(meter_type, series);
    }

    let car_documents =
        merge_car_documents(&local.car_documents, &remote.car_documents, &mut anomalies);
    let prices = merge_prices(&local.prices, &remote.prices, &mut anomalies);

    let (last_modified, last_modified_by_device) = newest_stamp(
        (local.last_modified, &local.last_modified_by_device),
        (remote.last_modified, &remote.last_modified_by_device),
    );

    for anomaly in &anomalies {
        tracing::warn!("Dropped malformed record during merge: {}", anomaly);
    }

    MergeOutcome {
        snapshot: Snapshot {
            readings,
            car_documents,
            prices,
            last_modified,
            last_modified_by_device,
        },
        anomalies,
    }
}

fn merge_series(
    meter_type: MeterType,
    local: Option<&MeterSeries>,
    remote: Option<&MeterSeries>,
    anomalies: &mut Vec<MergeAnomaly>,
) -> MeterSeries {
    let mut merged = MeterSeries::new();
    for reading in local
        .into_iter()
        .chain(remote)
        .flat_map(|series| series.entries())
    {
        match check_reading(meter_type, reading) {
            Ok(()) => merged.upsert(reading.clone()),
            Err(kind) => anomalies.push(MergeAnomaly {
                meter_type: Some(meter_type),
                reading_id: (!reading.id.is_empty()).then(|| reading.id.clone()),
                field: None,
                kind,
            }),
        }
    }
    merged
}

/// Structural checks a reading must pass to take part in a merge.
pub fn check_reading(meter_type: MeterType, reading: &Reading) -> Result<(), AnomalyKind> {
    if reading.id.is_empty() {
        return Err(AnomalyKind::MissingId);
    }
    check_stamp(reading.last_modified)?;
    if !reading.value.is_finite() || reading.value < 0.0 {
        return Err(AnomalyKind::InvalidValue);
    }
    if reading.meter_type != meter_type {
        return Err(AnomalyKind::WrongSeries {
            found: reading.meter_type,
        });
    }
    Ok(())
}

/// Checks a car document must pass to take part in a merge.
pub fn check_car_document(field: CarField, document: &CarDocument) -> Result<(), AnomalyKind> {
    check_stamp(document.last_modified)?;
    match (field.takes_kilometers(), document.value) {
        (true, CarValue::Kilometers(_)) | (false, CarValue::Date(_)) => Ok(()),
        _ => Err(AnomalyKind::InvalidValue),
    }
}

/// Checks a unit price must pass to take part in a merge.
pub fn check_price(price: &Price) -> Result<(), AnomalyKind> {
    check_stamp(price.last_modified)?;
    if !price.value.is_finite() || price.value <= 0.0 {
        return Err(AnomalyKind::InvalidValue);
    }
    Ok(())
}

fn check_stamp(last_modified: i64) -> Result<(), AnomalyKind> {
    if last_modified <= 0 {
        return Err(AnomalyKind::MissingLastModified);
    }
    if last_modified > MAX_TIMESTAMP_MS {
        return Err(AnomalyKind::TimestampOutOfRange(last_modified));
    }
    Ok(())
}

// Local entries are visited first and only a strictly newer stamp replaces
// the current winner, so a tie keeps the local value.
fn merge_car_documents(
    local: &CarDocuments,
    remote: &CarDocuments,
    anomalies: &mut Vec<MergeAnomaly>,
) -> CarDocuments {
    let mut merged = CarDocuments::default();
    for (field, incoming) in local.iter().chain(remote.iter()) {
        if let Err(kind) = check_car_document(field, incoming) {
            anomalies.push(MergeAnomaly::for_field(RecordField::CarDocument(field), kind));
            continue;
        }
        let keep_current = merged
            .get(field)
            .is_some_and(|current| current.last_modified >= incoming.last_modified);
        if !keep_current {
            merged.set(field, *incoming);
        }
    }
    merged
}

fn merge_prices(
    local: &PriceTable,
    remote: &PriceTable,
    anomalies: &mut Vec<MergeAnomaly>,
) -> PriceTable {
    let mut merged = PriceTable::default();
    for (field, incoming) in local.iter().chain(remote.iter()) {
        if let Err(kind) = check_price(incoming) {
            anomalies.push(MergeAnomaly::for_field(RecordField::Price(field), kind));
            continue;
        }
        let keep_current = merged
            .get(field)
            .is_some_and(|current| current.last_modified >= incoming.last_modified);
        if !keep_current {
            merged.set(field, *incoming);
        }
    }
    merged
}

fn newest_stamp(local: (i64, &DeviceId), remote: (i64, &DeviceId)) -> (i64, DeviceId) {
    let newest = if remote > local { remote } else { local };
    (newest.0, newest.1.clone())
}
