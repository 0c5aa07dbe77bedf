//! Local persistence for Meterbook

mod connection;
mod migrations;
mod persistence;

pub use connection::{AnomalyRecord, Database};
pub use persistence::{MemoryPersistence, Persistence};
