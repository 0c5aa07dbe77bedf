//! Sync status types shared by clients.

use serde::Serialize;

/// What the scheduler is doing right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPhase {
    Disabled,
    Idle,
    Syncing,
}

/// Result of the most recent finished sync run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "result")]
pub enum SyncOutcome {
    Synced {
        at: i64,
        /// Readings in the merged snapshot, tombstones included
        entries: usize,
        anomalies: usize,
    },
    Failed {
        at: i64,
        message: String,
    },
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Synced { .. })
    }
}

/// Published on the scheduler's watch channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub last_outcome: Option<SyncOutcome>,
}

impl SyncStatus {
    #[must_use]
    pub const fn new(phase: SyncPhase) -> Self {
        Self {
            phase,
            last_outcome: None,
        }
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::new(SyncPhase::Disabled)
    }
}
