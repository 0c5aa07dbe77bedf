//! Error types for meterbook-core

use thiserror::Error;

/// Result type alias using meterbook-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in meterbook-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown meter type, car field or price field
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Bad input reaching a mutation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Reading not found
    #[error("Reading not found: {0}")]
    NotFound(String),

    /// Sync was requested while disabled
    #[error("Sync is disabled for this device")]
    SyncDisabled,

    /// Remote pull/push failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Local load/save failure
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures talking to the remote snapshot store.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid transport configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Sync HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Sync API error: {message} ({status})")]
    Api { status: u16, message: String },
    #[error("Invalid snapshot payload: {0}")]
    Decode(String),
    #[error("Remote unavailable: {0}")]
    Unavailable(String),
}

/// Failures loading or saving local state.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Persistence IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Stored state could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Stored state is corrupt: {0}")]
    Corrupt(String),
}
