//! Snapshot exchange with the group store and the sync scheduler.

pub mod codec;
mod scheduler;
mod transport;

pub use codec::{decode_snapshot, encode_snapshot, DecodedSnapshot};
pub use scheduler::{
    SchedulerConfig, SchedulerHandle, SyncReport, SyncRun, SyncScheduler, DEFAULT_DEBOUNCE,
    DEFAULT_SYNC_INTERVAL,
};
pub use transport::{HttpTransport, MemoryTransport, Transport, DEFAULT_REQUEST_TIMEOUT};
