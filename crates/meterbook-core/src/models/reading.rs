//! Meter reading model

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Opaque reading identifier, stable across devices.
///
/// Locally generated ids are UUID v7 strings; ids received from other
/// devices are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ReadingId(String);

impl ReadingId {
    /// Create a new unique reading ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for ReadingId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ReadingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one installed client.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Utility meter categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum MeterType {
    WaterBath,
    WaterKitchen,
    Gas,
    Electric,
}

impl MeterType {
    pub const ALL: [Self; 4] = [Self::WaterBath, Self::WaterKitchen, Self::Gas, Self::Electric];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WaterBath => "waterBath",
            Self::WaterKitchen => "waterKitchen",
            Self::Gas => "gas",
            Self::Electric => "electric",
        }
    }

    #[must_use]
    pub const fn is_water(self) -> bool {
        matches!(self, Self::WaterBath | Self::WaterKitchen)
    }
}

impl fmt::Display for MeterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeterType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], "");
        match normalized.as_str() {
            "waterbath" => Ok(Self::WaterBath),
            "waterkitchen" => Ok(Self::WaterKitchen),
            "gas" => Ok(Self::Gas),
            "electric" => Ok(Self::Electric),
            _ => Err(Error::InvalidArgument(format!("unknown meter type '{s}'"))),
        }
    }
}

/// One measurement event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Stable id; empty when a remote payload omitted it
    #[serde(default)]
    pub id: ReadingId,
    pub meter_type: MeterType,
    pub value: f64,
    /// Calendar date the reading represents
    pub date: NaiveDate,
    /// Local creation timestamp (Unix ms)
    #[serde(default)]
    pub captured_at: i64,
    #[serde(default)]
    pub origin_device: DeviceId,
    /// Creation or tombstone timestamp (Unix ms); 0 when missing
    #[serde(default)]
    pub last_modified: i64,
    /// Tombstone flag
    #[serde(default)]
    pub deleted: bool,
}

impl Reading {
    /// Total order used to pick between two versions of the same reading.
    ///
    /// Greater `last_modified` wins, then greater `origin_device`, then a
    /// tombstone over a live entry, then value and date. The order is total,
    /// so the winner does not depend on which side an entry came from.
    #[must_use]
    pub fn precedence(&self, other: &Self) -> Ordering {
        self.last_modified
            .cmp(&other.last_modified)
            .then_with(|| self.origin_device.cmp(&other.origin_device))
            .then_with(|| self.deleted.cmp(&other.deleted))
            .then_with(|| self.value.total_cmp(&other.value))
            .then_with(|| self.date.cmp(&other.date))
            .then_with(|| self.captured_at.cmp(&other.captured_at))
    }

    /// Pick the winning version of two same-id readings.
    #[must_use]
    pub fn newer(self, other: Self) -> Self {
        if other.precedence(&self) == Ordering::Greater {
            other
        } else {
            self
        }
    }

    #[must_use]
    pub const fn is_live(&self) -> bool {
        !self.deleted
    }
}

/// Readings for one meter type, keyed by id.
///
/// Serialized as a list in display order; identity is the id, never the
/// position.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Reading>", into = "Vec<Reading>")]
pub struct MeterSeries {
    entries: BTreeMap<ReadingId, Reading>,
}

impl MeterSeries {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a reading, keeping the newer version when the id already exists.
    pub fn upsert(&mut self, reading: Reading) {
        let merged = match self.entries.remove(&reading.id) {
            Some(existing) => existing.newer(reading),
            None => reading,
        };
        self.entries.insert(merged.id.clone(), merged);
    }

    #[must_use]
    pub fn get(&self, id: &ReadingId) -> Option<&Reading> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &ReadingId) -> Option<&mut Reading> {
        self.entries.get_mut(id)
    }

    /// All entries including tombstones, in id order.
    pub fn entries(&self) -> impl Iterator<Item = &Reading> {
        self.entries.values()
    }

    /// Live readings, newest date first.
    #[must_use]
    pub fn display(&self) -> Vec<&Reading> {
        let mut live = self.entries.values().filter(|r| r.is_live()).collect::<Vec<_>>();
        live.sort_by(|a, b| display_order(a, b));
        live
    }

    /// Most recent live reading by date.
    #[must_use]
    pub fn latest(&self) -> Option<&Reading> {
        self.display().into_iter().next()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.entries.values().filter(|r| r.is_live()).count()
    }
}

fn display_order(a: &Reading, b: &Reading) -> Ordering {
    b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id))
}

impl From<Vec<Reading>> for MeterSeries {
    fn from(readings: Vec<Reading>) -> Self {
        let mut series = Self::new();
        for reading in readings {
            series.upsert(reading);
        }
        series
    }
}

impl From<MeterSeries> for Vec<Reading> {
    fn from(series: MeterSeries) -> Self {
        let mut readings = series.entries.into_values().collect::<Self>();
        readings.sort_by(display_order);
        readings
    }
}

impl FromIterator<Reading> for MeterSeries {
    fn from_iter<I: IntoIterator<Item = Reading>>(iter: I) -> Self {
        let mut series = Self::new();
        for reading in iter {
            series.upsert(reading);
        }
        series
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(id: &str, date: &str, last_modified: i64) -> Reading {
        Reading {
            id: ReadingId::from(id),
            meter_type: MeterType::Gas,
            value: 10.0,
            date: date.parse().unwrap(),
            captured_at: last_modified,
            origin_device: DeviceId::from("device-a"),
            last_modified,
            deleted: false,
        }
    }

    #[test]
    fn reading_id_unique() {
        assert_ne!(ReadingId::new(), ReadingId::new());
    }

    #[test]
    fn meter_type_parse_accepts_common_spellings() {
        assert_eq!("waterBath".parse::<MeterType>().unwrap(), MeterType::WaterBath);
        assert_eq!("water-kitchen".parse::<MeterType>().unwrap(), MeterType::WaterKitchen);
        assert_eq!(" GAS ".parse::<MeterType>().unwrap(), MeterType::Gas);
        assert!(matches!(
            "steam".parse::<MeterType>(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn meter_type_serializes_camel_case() {
        let json = serde_json::to_string(&MeterType::WaterKitchen).unwrap();
        assert_eq!(json, "\"waterKitchen\"");
    }

    #[test]
    fn newer_prefers_greater_last_modified() {
        let old = reading("r1", "2024-03-01", 100);
        let new = reading("r1", "2024-03-01", 200);
        assert_eq!(old.clone().newer(new.clone()).last_modified, 200);
        assert_eq!(new.newer(old).last_modified, 200);
    }

    #[test]
    fn newer_breaks_ties_on_origin_device() {
        let a = reading("r1", "2024-03-01", 100);
        let mut b = reading("r1", "2024-03-01", 100);
        b.origin_device = DeviceId::from("device-b");
        b.value = 11.0;
        assert_eq!(a.clone().newer(b.clone()).value, 11.0);
        assert_eq!(b.newer(a).value, 11.0);
    }

    #[test]
    fn tombstone_wins_full_tie() {
        let live = reading("r1", "2024-03-01", 100);
        let mut dead = live.clone();
        dead.deleted = true;
        assert!(live.clone().newer(dead.clone()).deleted);
        assert!(dead.newer(live).deleted);
    }

    #[test]
    fn series_display_sorted_by_date_desc_without_tombstones() {
        let mut deleted = reading("r3", "2024-03-20", 300);
        deleted.deleted = true;
        let series = MeterSeries::from(vec![
            reading("r1", "2024-01-10", 100),
            reading("r2", "2024-02-10", 200),
            deleted,
        ]);

        let ids = series
            .display()
            .iter()
            .map(|r| r.id.to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["r2", "r1"]);
        assert_eq!(series.len(), 3);
        assert_eq!(series.live_count(), 2);
    }

    #[test]
    fn series_deserialize_collapses_duplicate_ids() {
        let json = r#"[
            {"id":"r1","meterType":"gas","value":1.0,"date":"2024-03-01","lastModified":100},
            {"id":"r1","meterType":"gas","value":2.0,"date":"2024-03-01","lastModified":300},
            {"id":"r1","meterType":"gas","value":3.0,"date":"2024-03-01","lastModified":200}
        ]"#;
        let series: MeterSeries = serde_json::from_str(json).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.get(&ReadingId::from("r1")).unwrap().value, 2.0);
    }
}
