use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] meterbook_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Reading not found for id/prefix: {0}")]
    ReadingNotFound(String),
    #[error("{0}")]
    AmbiguousReadingId(String),
    #[error("Reading ID cannot be empty")]
    EmptyReadingId,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Sync is not configured. Run `meterbook config set --endpoint <URL>` or set METERBOOK_ENDPOINT."
    )]
    SyncNotConfigured,
    #[error(
        "Sync is disabled for this device. Run `meterbook sync join <CODE>` or set METERBOOK_GROUP."
    )]
    SyncDisabled,
}

impl From<meterbook_core::PersistenceError> for CliError {
    fn from(error: meterbook_core::PersistenceError) -> Self {
        Self::Core(error.into())
    }
}
