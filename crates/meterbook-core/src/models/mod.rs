//! Data models for Meterbook

mod car;
mod prices;
mod reading;
mod snapshot;
mod sync_state;

pub use car::{CarDocument, CarDocuments, CarField, CarValue};
pub use prices::{Price, PriceField, PriceTable};
pub use reading::{DeviceId, MeterSeries, MeterType, Reading, ReadingId};
pub use snapshot::Snapshot;
pub use sync_state::{KnownDevice, SyncState};
