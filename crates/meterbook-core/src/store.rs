//! Authoritative local state and its mutations.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::models::{
    CarDocument, CarField, CarValue, DeviceId, MeterType, Price, PriceField, Reading, ReadingId,
    Snapshot,
};
use crate::util::{Clock, SystemClock};

/// In-memory reading histories, car documents and prices for one device.
///
/// Every mutation stamps `last_modified` from the store's clock and tags new
/// readings with the local device id. Deleted readings stay as tombstones.
pub struct ReadingStore {
    snapshot: Snapshot,
    device_id: DeviceId,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ReadingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadingStore")
            .field("device_id", &self.device_id)
            .field("entries", &self.snapshot.entry_count())
            .field("last_modified", &self.snapshot.last_modified)
            .finish_non_exhaustive()
    }
}

impl ReadingStore {
    /// Empty store using the wall clock.
    #[must_use]
    pub fn new(device_id: DeviceId) -> Self {
        Self::with_clock(device_id, Snapshot::default(), Arc::new(SystemClock))
    }

    /// Store seeded from previously persisted state.
    #[must_use]
    pub fn from_snapshot(device_id: DeviceId, snapshot: Snapshot) -> Self {
        Self::with_clock(device_id, snapshot, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(device_id: DeviceId, snapshot: Snapshot, clock: Arc<dyn Clock>) -> Self {
        Self {
            snapshot,
            device_id,
            clock,
        }
    }

    #[must_use]
    pub const fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Record a new reading.
    pub fn add_reading(&mut self, meter_type: MeterType, value: f64, date: NaiveDate) -> Result<Reading> {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::Validation(format!(
                "reading value must be a non-negative number, got {value}"
            )));
        }

        let now = self.clock.now_millis();
        let reading = Reading {
            id: ReadingId::new(),
            meter_type,
            value,
            date,
            captured_at: now,
            origin_device: self.device_id.clone(),
            last_modified: now,
            deleted: false,
        };

        self.snapshot.series_mut(meter_type).upsert(reading.clone());
        self.snapshot.touch(now, &self.device_id);
        tracing::debug!("Added {} reading {} for {}", meter_type, reading.id, date);
        Ok(reading)
    }

    /// Record a new reading from loosely typed input (meter name, ISO date).
    pub fn add_reading_raw(&mut self, meter_type: &str, value: f64, date: &str) -> Result<Reading> {
        let meter_type = meter_type.parse::<MeterType>()?;
        let date = parse_iso_date(date)?;
        self.add_reading(meter_type, value, date)
    }

    /// Tombstone a reading. Deleting an existing tombstone is a no-op.
    pub fn delete_reading(&mut self, meter_type: MeterType, id: &ReadingId) -> Result<()> {
        let now = self.clock.now_millis();
        let reading = self
            .snapshot
            .readings
            .get_mut(&meter_type)
            .and_then(|series| series.get_mut(id))
            .ok_or_else(|| Error::NotFound(format!("{meter_type}/{id}")))?;

        if reading.deleted {
            return Ok(());
        }

        // The tombstone must outrank the version it replaces.
        let stamp = now.max(reading.last_modified.saturating_add(1));
        reading.deleted = true;
        reading.last_modified = stamp;
        self.snapshot.touch(stamp, &self.device_id);
        tracing::debug!("Deleted {} reading {}", meter_type, id);
        Ok(())
    }

    /// Set a car document field.
    pub fn update_car_document(&mut self, field: CarField, value: CarValue) -> Result<()> {
        match (field.takes_kilometers(), value) {
            (true, CarValue::Kilometers(_)) | (false, CarValue::Date(_)) => {}
            (true, CarValue::Date(_)) => {
                return Err(Error::Validation(format!(
                    "{field} expects an odometer value in km"
                )));
            }
            (false, CarValue::Kilometers(_)) => {
                return Err(Error::Validation(format!("{field} expects a date")));
            }
        }

        let previous = self
            .snapshot
            .car_documents
            .get(field)
            .map_or(0, |doc| doc.last_modified);
        let stamp = self.clock.now_millis().max(previous.saturating_add(1));
        self.snapshot.car_documents.set(
            field,
            CarDocument {
                value,
                last_modified: stamp,
            },
        );
        self.snapshot.touch(stamp, &self.device_id);
        Ok(())
    }

    /// Set a unit price.
    pub fn update_price(&mut self, field: PriceField, value: f64) -> Result<()> {
        if !value.is_finite() || value <= 0.0 {
            return Err(Error::Validation(format!(
                "{field} price must be a positive number, got {value}"
            )));
        }

        let previous = self
            .snapshot
            .prices
            .get(field)
            .map_or(0, |price| price.last_modified);
        let stamp = self.clock.now_millis().max(previous.saturating_add(1));
        self.snapshot.prices.set(
            field,
            Price {
                value,
                last_modified: stamp,
            },
        );
        self.snapshot.touch(stamp, &self.device_id);
        Ok(())
    }

    /// Live readings for a meter type, newest date first.
    #[must_use]
    pub fn readings(&self, meter_type: MeterType) -> Vec<Reading> {
        self.snapshot
            .display(meter_type)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Copy of the full state, tombstones included.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.clone()
    }

    #[must_use]
    pub const fn view(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Atomically replace the state (merge apply).
    pub fn replace(&mut self, snapshot: Snapshot) {
        self.snapshot = snapshot;
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_iso_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|error| Error::Validation(format!("invalid date '{raw}': {error}")))
}
