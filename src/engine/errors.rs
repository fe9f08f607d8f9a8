//! Engine error taxonomy
//!
//! Every failure carries a stable machine code and a human-readable
//! message. Messages never include internal identifiers beyond the
//! record id the caller already supplied. All validation happens before
//! any mutation, so a returned error implies no state change.

use thiserror::Error;

use crate::model::{RecordId, RecordType};
use crate::store::StoreError;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Failures surfaced to the engine's callers
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown type tag at ingestion
    #[error("unknown record type: {0:?}")]
    InvalidRecordType(String),

    /// A daily-unique type already has a record for this student today
    #[error("a {record_type} record already exists for this student on {date}")]
    DuplicateDailyRecord {
        record_type: RecordType,
        date: chrono::NaiveDate,
    },

    /// Reward-credit ingestion with no unresolved demerit to offset
    #[error("student holds no unresolved demerit for this semester")]
    NoEligibleDemerit,

    /// Exchange asked for more batches than the unconsumed pool covers
    #[error("not enough unconsumed {record_type} records: need {needed}, have {available}")]
    InsufficientSources {
        record_type: RecordType,
        needed: usize,
        available: usize,
    },

    /// Referenced record id does not exist
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// Authorization failure or an attempt to mutate a terminal record
    #[error("{0}")]
    Forbidden(String),

    /// Underlying persistence failure; not retried by the engine
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub(crate) fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }

    /// Stable machine code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRecordType(_) => "INVALID_RECORD_TYPE",
            Self::DuplicateDailyRecord { .. } => "DUPLICATE_DAILY_RECORD",
            Self::NoEligibleDemerit => "NO_ELIGIBLE_DEMERIT",
            Self::InsufficientSources { .. } => "INSUFFICIENT_SOURCES",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Store(_) => "STORE_UNAVAILABLE",
        }
    }

    /// HTTP status the outer API layer should map this to
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRecordType(_) => 400,
            Self::NoEligibleDemerit => 400,
            Self::InsufficientSources { .. } => 400,
            Self::DuplicateDailyRecord { .. } => 409,
            Self::NotFound(_) => 404,
            Self::Forbidden(_) => 403,
            Self::Store(_) => 500,
        }
    }

    /// Client errors are the caller's fault and must not be retried
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}
