//! Local persistence abstraction

use std::sync::Mutex;

use crate::error::PersistenceError;
use crate::merge::MergeAnomaly;
use crate::models::{Snapshot, SyncState};

/// Storage for the merged local state.
///
/// `load` returns an empty snapshot when nothing has been saved yet.
pub trait Persistence: Send + Sync {
    /// Load the last saved snapshot
    fn load(&self) -> Result<Snapshot, PersistenceError>;

    /// Save the snapshot, replacing the previous one
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError>;

    /// Load sync bookkeeping, if any was saved
    fn load_sync_state(&self) -> Result<Option<SyncState>, PersistenceError>;

    /// Save sync bookkeeping
    fn save_sync_state(&self, state: &SyncState) -> Result<(), PersistenceError>;

    /// Keep a record of dropped merge input. Backends without a log ignore it.
    fn record_anomalies(
        &self,
        _anomalies: &[MergeAnomaly],
        _recorded_at: i64,
    ) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// Process-local persistence for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    snapshot: Mutex<Option<Snapshot>>,
    sync_state: Mutex<Option<SyncState>>,
    anomalies: Mutex<Vec<MergeAnomaly>>,
    fail_saves: Mutex<bool>,
}

impl MemoryPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail, to exercise error paths.
    pub fn fail_saves(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_saves.lock() {
            *flag = fail;
        }
    }

    /// Anomalies recorded so far.
    pub fn anomalies(&self) -> Vec<MergeAnomaly> {
        self.anomalies
            .lock()
            .map(|anomalies| anomalies.clone())
            .unwrap_or_default()
    }

    fn check_writable(&self) -> Result<(), PersistenceError> {
        let failing = self.fail_saves.lock().map(|flag| *flag).unwrap_or(false);
        if failing {
            return Err(PersistenceError::Io(std::io::Error::other(
                "simulated write failure",
            )));
        }
        Ok(())
    }
}

fn poisoned<T>(_: T) -> PersistenceError {
    PersistenceError::Corrupt("state lock poisoned".to_string())
}

impl Persistence for MemoryPersistence {
    fn load(&self) -> Result<Snapshot, PersistenceError> {
        Ok(self.snapshot.lock().map_err(poisoned)?.clone().unwrap_or_default())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        self.check_writable()?;
        *self.snapshot.lock().map_err(poisoned)? = Some(snapshot.clone());
        Ok(())
    }

    fn load_sync_state(&self) -> Result<Option<SyncState>, PersistenceError> {
        Ok(self.sync_state.lock().map_err(poisoned)?.clone())
    }

    fn save_sync_state(&self, state: &SyncState) -> Result<(), PersistenceError> {
        self.check_writable()?;
        *self.sync_state.lock().map_err(poisoned)? = Some(state.clone());
        Ok(())
    }

    fn record_anomalies(
        &self,
        anomalies: &[MergeAnomaly],
        _recorded_at: i64,
    ) -> Result<(), PersistenceError> {
        self.anomalies
            .lock()
            .map_err(poisoned)?
            .extend_from_slice(anomalies);
        Ok(())
    }
}
