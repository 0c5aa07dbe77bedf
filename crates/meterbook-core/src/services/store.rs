//! Shared store service used by the scheduler and clients.

use std::path::Path;
use std::sync::{Arc, PoisonError};

use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::db::{Database, MemoryPersistence, Persistence};
use crate::merge::{merge, MergeAnomaly, MergeOutcome};
use crate::models::{
    CarField, CarValue, DeviceId, MeterType, PriceField, Reading, ReadingId, Snapshot, SyncState,
};
use crate::store::ReadingStore;
use crate::util::{Clock, SystemClock};
use crate::Result;

/// Thread-safe handle to the local store and its persistence.
///
/// Mutations and merge-apply are serialized by one mutex, and each is saved
/// before the lock is released. A failed save rolls the in-memory state back,
/// so memory never runs ahead of disk. Sync state updates are serialized by a
/// second lock.
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<Mutex<ReadingStore>>,
    sync_state_lock: Arc<std::sync::Mutex<()>>,
    persistence: Arc<dyn Persistence>,
    device_id: DeviceId,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

impl StoreHandle {
    /// Open the store backed by a `SQLite` file at `db_path`.
    pub fn open_path(db_path: impl AsRef<Path>) -> Result<Self> {
        let database = Database::open(db_path)?;
        Self::open(Arc::new(database))
    }

    /// Open a store that lives only in memory (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Arc::new(MemoryPersistence::new()))
    }

    /// Load state from `persistence` using the wall clock.
    pub fn open(persistence: Arc<dyn Persistence>) -> Result<Self> {
        Self::open_with_clock(persistence, Arc::new(SystemClock))
    }

    /// Load state from `persistence`, registering a device id on first run.
    pub fn open_with_clock(persistence: Arc<dyn Persistence>, clock: Arc<dyn Clock>) -> Result<Self> {
        let device_id = if let Some(state) = persistence.load_sync_state()? {
            state.device_id
        } else {
            let state = SyncState::new(DeviceId::generate());
            persistence.save_sync_state(&state)?;
            tracing::info!("Registered new device {}", state.device_id);
            state.device_id
        };

        let snapshot = persistence.load()?;
        tracing::debug!(
            "Loaded {} stored readings for device {}",
            snapshot.entry_count(),
            device_id
        );
        let store = ReadingStore::with_clock(device_id.clone(), snapshot, clock.clone());

        Ok(Self {
            store: Arc::new(Mutex::new(store)),
            sync_state_lock: Arc::new(std::sync::Mutex::new(())),
            persistence,
            device_id,
            clock,
        })
    }

    #[must_use]
    pub const fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Current time according to the store's clock (Unix ms).
    #[must_use]
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Saved sync bookkeeping, or a fresh disabled state.
    pub fn sync_state(&self) -> Result<SyncState> {
        Ok(self
            .persistence
            .load_sync_state()?
            .unwrap_or_else(|| SyncState::new(self.device_id.clone())))
    }

    pub fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        let _guard = self.lock_sync_state();
        self.persistence.save_sync_state(state)?;
        Ok(())
    }

    /// Load, change and save the sync state without losing concurrent updates.
    pub fn update_sync_state<T>(&self, apply: impl FnOnce(&mut SyncState) -> T) -> Result<T> {
        let _guard = self.lock_sync_state();
        let mut state = self.sync_state()?;
        let value = apply(&mut state);
        self.persistence.save_sync_state(&state)?;
        Ok(value)
    }

    /// Turn sync off for this device. Local data, the group id and the device
    /// registry are kept.
    pub fn disable_sync(&self) -> Result<SyncState> {
        let state = self.update_sync_state(|state| {
            state.enabled = false;
            state.clone()
        })?;
        tracing::info!("Sync disabled for device {}", self.device_id);
        Ok(state)
    }

    fn lock_sync_state(&self) -> std::sync::MutexGuard<'_, ()> {
        self.sync_state_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a new reading.
    pub async fn add_reading(
        &self,
        meter_type: MeterType,
        value: f64,
        date: NaiveDate,
    ) -> Result<Reading> {
        self.mutate(|store| store.add_reading(meter_type, value, date))
            .await
    }

    /// Tombstone a reading.
    pub async fn delete_reading(&self, meter_type: MeterType, id: &ReadingId) -> Result<()> {
        self.mutate(|store| store.delete_reading(meter_type, id))
            .await
    }

    pub async fn update_car_document(&self, field: CarField, value: CarValue) -> Result<()> {
        self.mutate(|store| store.update_car_document(field, value))
            .await
    }

    pub async fn update_price(&self, field: PriceField, value: f64) -> Result<()> {
        self.mutate(|store| store.update_price(field, value)).await
    }

    /// Live readings for a meter type, newest date first.
    pub async fn readings(&self, meter_type: MeterType) -> Vec<Reading> {
        self.store.lock().await.readings(meter_type)
    }

    /// Copy of the full local state.
    pub async fn snapshot(&self) -> Snapshot {
        self.store.lock().await.snapshot()
    }

    /// Merge `remote` into local state, persist it and swap it in.
    ///
    /// Local state is untouched if saving the merged result fails.
    pub async fn apply_merge(&self, remote: &Snapshot) -> Result<MergeOutcome> {
        self.apply_remote(remote, Vec::new()).await
    }

    /// Like [`Self::apply_merge`] for a remote that lost `skipped` records
    /// while being decoded. They are reported ahead of the merge anomalies.
    pub async fn apply_remote(
        &self,
        remote: &Snapshot,
        skipped: Vec<MergeAnomaly>,
    ) -> Result<MergeOutcome> {
        let mut store = self.store.lock().await;
        let mut outcome = merge(store.view(), remote);
        if !skipped.is_empty() {
            outcome.anomalies.splice(0..0, skipped);
        }

        if !outcome.anomalies.is_empty() {
            if let Err(error) = self
                .persistence
                .record_anomalies(&outcome.anomalies, self.clock.now_millis())
            {
                tracing::warn!("Failed to record merge anomalies: {}", error);
            }
        }

        self.persistence.save(&outcome.snapshot)?;
        store.replace(outcome.snapshot.clone());
        Ok(outcome)
    }

    async fn mutate<T>(&self, apply: impl FnOnce(&mut ReadingStore) -> Result<T>) -> Result<T> {
        let mut store = self.store.lock().await;
        let previous = store.snapshot();
        let value = apply(&mut *store)?;

        if let Err(error) = self.persistence.save(store.view()) {
            store.replace(previous);
            return Err(error.into());
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{AnomalyKind, RecordField};
    use crate::models::Price;
    use crate::util::ManualClock;
    use crate::Error;
    use pretty_assertions::assert_eq;

    fn date(raw: &str) -> NaiveDate {
        raw.parse().unwrap()
    }

    fn open(persistence: &Arc<MemoryPersistence>, start: i64) -> StoreHandle {
        StoreHandle::open_with_clock(persistence.clone(), Arc::new(ManualClock::new(start)))
            .unwrap()
    }

    #[tokio::test]
    async fn mutations_are_persisted() {
        let persistence = Arc::new(MemoryPersistence::new());
        let handle = open(&persistence, 1_000);

        let reading = handle
            .add_reading(MeterType::Gas, 12.5, date("2024-03-01"))
            .await
            .unwrap();
        handle.update_price(PriceField::Gas, 3.2).await.unwrap();

        let saved = persistence.load().unwrap();
        assert_eq!(
            saved.reading(MeterType::Gas, &reading.id),
            Some(&reading)
        );
        assert_eq!(saved.prices.value(PriceField::Gas), Some(3.2));
    }

    #[tokio::test]
    async fn device_id_is_stable_across_reopen() {
        let persistence = Arc::new(MemoryPersistence::new());
        let first = open(&persistence, 1).device_id().clone();
        let second = open(&persistence, 2).device_id().clone();
        assert_eq!(first, second);
        assert!(!first.as_str().is_empty());
    }

    #[tokio::test]
    async fn failed_save_rolls_back_mutation() {
        let persistence = Arc::new(MemoryPersistence::new());
        let handle = open(&persistence, 1_000);
        persistence.fail_saves(true);

        let error = handle
            .add_reading(MeterType::Electric, 10.0, date("2024-03-01"))
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Persistence(_)));
        assert!(handle.readings(MeterType::Electric).await.is_empty());
        assert_eq!(handle.snapshot().await, Snapshot::default());
    }

    #[tokio::test]
    async fn apply_merge_replaces_state_and_logs_anomalies() {
        let persistence = Arc::new(MemoryPersistence::new());
        let handle = open(&persistence, 1_000);
        handle
            .add_reading(MeterType::Gas, 1.0, date("2024-03-01"))
            .await
            .unwrap();

        let mut remote = Snapshot::default();
        let series = remote.series_mut(MeterType::Gas);
        series.upsert(Reading {
            id: ReadingId::from("remote-1"),
            meter_type: MeterType::Gas,
            value: 2.0,
            date: date("2024-02-01"),
            captured_at: 500,
            origin_device: DeviceId::from("other"),
            last_modified: 500,
            deleted: false,
        });
        series.upsert(Reading {
            id: ReadingId::from("broken"),
            meter_type: MeterType::Gas,
            value: 3.0,
            date: date("2024-02-02"),
            captured_at: 0,
            origin_device: DeviceId::from("other"),
            last_modified: 0,
            deleted: false,
        });

        let outcome = handle.apply_merge(&remote).await.unwrap();

        assert_eq!(outcome.anomalies.len(), 1);
        assert_eq!(persistence.anomalies(), outcome.anomalies);
        assert_eq!(handle.readings(MeterType::Gas).await.len(), 2);
        assert_eq!(persistence.load().unwrap(), handle.snapshot().await);
    }

    #[tokio::test]
    async fn apply_merge_keeps_local_state_when_save_fails() {
        let persistence = Arc::new(MemoryPersistence::new());
        let handle = open(&persistence, 1_000);
        handle
            .add_reading(MeterType::Gas, 1.0, date("2024-03-01"))
            .await
            .unwrap();
        let before = handle.snapshot().await;

        let mut remote = Snapshot::default();
        remote.series_mut(MeterType::Electric).upsert(Reading {
            id: ReadingId::from("e1"),
            meter_type: MeterType::Electric,
            value: 2.0,
            date: date("2024-02-01"),
            captured_at: 500,
            origin_device: DeviceId::from("other"),
            last_modified: 500,
            deleted: false,
        });

        persistence.fail_saves(true);
        assert!(handle.apply_merge(&remote).await.is_err());
        assert_eq!(handle.snapshot().await, before);
    }

    #[tokio::test]
    async fn apply_remote_records_decode_anomalies_first() {
        let persistence = Arc::new(MemoryPersistence::new());
        let handle = open(&persistence, 1_000);
        let skipped = MergeAnomaly {
            meter_type: Some(MeterType::Electric),
            reading_id: Some(ReadingId::from("e2")),
            field: None,
            kind: AnomalyKind::Undecodable("invalid type".to_string()),
        };
        let mut remote = Snapshot::default();
        remote.prices.set(
            PriceField::Gas,
            Price {
                value: -1.0,
                last_modified: 500,
            },
        );

        let outcome = handle
            .apply_remote(&remote, vec![skipped.clone()])
            .await
            .unwrap();

        assert_eq!(
            outcome.anomalies,
            vec![
                skipped,
                MergeAnomaly::for_field(RecordField::Price(PriceField::Gas), AnomalyKind::InvalidValue),
            ]
        );
        assert_eq!(persistence.anomalies(), outcome.anomalies);
        assert!(handle.snapshot().await.prices.get(PriceField::Gas).is_none());
    }

    #[test]
    fn update_sync_state_keeps_concurrent_changes() {
        let persistence = Arc::new(MemoryPersistence::new());
        let handle = open(&persistence, 1_000);

        let writers = (0..8)
            .map(|n| {
                let handle = handle.clone();
                std::thread::spawn(move || {
                    handle
                        .update_sync_state(|state| {
                            let device = DeviceId::from(format!("device-{n}").as_str());
                            state.observe_device(&device, None, n);
                        })
                        .unwrap();
                })
            })
            .collect::<Vec<_>>();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(handle.sync_state().unwrap().devices.len(), 8);
    }

    #[tokio::test]
    async fn disable_sync_keeps_group_and_registry() {
        let persistence = Arc::new(MemoryPersistence::new());
        let handle = open(&persistence, 1_000);
        handle
            .update_sync_state(|state| {
                state.enabled = true;
                state.group_id = Some("family".to_string());
                state.observe_device(&DeviceId::from("phone"), Some("phone"), 10);
            })
            .unwrap();

        let state = handle.disable_sync().unwrap();

        assert!(!state.enabled);
        assert!(!state.is_configured());
        assert_eq!(state.group_id.as_deref(), Some("family"));
        assert_eq!(handle.sync_state().unwrap(), state);
    }
}
