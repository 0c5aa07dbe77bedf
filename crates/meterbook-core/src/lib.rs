//! meterbook-core - Core library for Meterbook
//!
//! This crate contains the shared models, reconciliation engine, persistence,
//! sync scheduling and reminder logic used by all Meterbook interfaces.

pub mod config;
pub mod consumption;
pub mod db;
pub mod error;
pub mod export;
pub mod merge;
pub mod models;
pub mod reminders;
pub mod services;
pub mod state;
pub mod store;
pub mod sync;
pub mod util;
pub mod validate;

pub use error::{Error, PersistenceError, Result, TransportError};
pub use merge::{merge, MergeAnomaly, MergeOutcome};
pub use models::{
    CarField, CarValue, DeviceId, MeterType, PriceField, Reading, ReadingId, Snapshot, SyncState,
};
pub use reminders::{evaluate, Reminder, ReminderKind, Severity};
pub use services::StoreHandle;
pub use state::{SyncOutcome, SyncPhase, SyncStatus};
pub use store::ReadingStore;
pub use sync::{SyncRun, SyncScheduler};
