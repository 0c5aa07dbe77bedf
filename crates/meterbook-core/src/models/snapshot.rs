//! Exchangeable group state

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{CarDocuments, DeviceId, MeterSeries, MeterType, PriceTable, Reading, ReadingId};

/// Full state of one family/group at a point in time.
///
/// This is both what gets persisted locally and what travels during sync.
/// Tombstoned readings are part of the snapshot; display views filter them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub readings: BTreeMap<MeterType, MeterSeries>,
    #[serde(default)]
    pub car_documents: CarDocuments,
    #[serde(default)]
    pub prices: PriceTable,
    /// Latest mutation timestamp across the snapshot (Unix ms)
    #[serde(default)]
    pub last_modified: i64,
    #[serde(default)]
    pub last_modified_by_device: DeviceId,
}

impl Snapshot {
    #[must_use]
    pub fn series(&self, meter_type: MeterType) -> Option<&MeterSeries> {
        self.readings.get(&meter_type)
    }

    pub fn series_mut(&mut self, meter_type: MeterType) -> &mut MeterSeries {
        self.readings.entry(meter_type).or_default()
    }

    /// Live readings for a meter type, newest date first.
    #[must_use]
    pub fn display(&self, meter_type: MeterType) -> Vec<&Reading> {
        self.series(meter_type)
            .map(MeterSeries::display)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn reading(&self, meter_type: MeterType, id: &ReadingId) -> Option<&Reading> {
        self.series(meter_type).and_then(|series| series.get(id))
    }

    /// Record that `device` mutated the snapshot at `at`.
    pub fn touch(&mut self, at: i64, device: &DeviceId) {
        if at >= self.last_modified {
            self.last_modified = at;
            self.last_modified_by_device = device.clone();
        }
    }

    /// Total number of stored entries, tombstones included.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.readings.values().map(MeterSeries::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn snapshot_json_shape() {
        let mut snapshot = Snapshot::default();
        snapshot.series_mut(MeterType::Gas).upsert(Reading {
            id: ReadingId::from("r1"),
            meter_type: MeterType::Gas,
            value: 120.0,
            date: "2024-03-01".parse().unwrap(),
            captured_at: 100,
            origin_device: DeviceId::from("a"),
            last_modified: 100,
            deleted: false,
        });
        snapshot.touch(100, &DeviceId::from("a"));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["readings"]["gas"][0]["id"], "r1");
        assert_eq!(json["lastModified"], 100);
        assert_eq!(json["lastModifiedByDevice"], "a");

        let parsed: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn touch_never_moves_backwards() {
        let mut snapshot = Snapshot::default();
        snapshot.touch(200, &DeviceId::from("a"));
        snapshot.touch(150, &DeviceId::from("b"));
        assert_eq!(snapshot.last_modified, 200);
        assert_eq!(snapshot.last_modified_by_device, DeviceId::from("a"));
    }

    #[test]
    fn missing_sections_default() {
        let parsed: Snapshot = serde_json::from_str("{}").unwrap();
        assert!(parsed.readings.is_empty());
        assert!(parsed.car_documents.is_empty());
        assert_eq!(parsed.last_modified, 0);
    }
}
