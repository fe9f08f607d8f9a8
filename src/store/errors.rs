//! Store error types

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a record store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not serve the request
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    /// Snapshot file I/O failed
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot content failed its checksum or did not parse
    #[error("snapshot corrupt: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Stable machine code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "STORE_UNAVAILABLE",
            Self::Io(_) => "STORE_IO",
            Self::Corrupt(_) => "STORE_CORRUPT",
        }
    }
}
