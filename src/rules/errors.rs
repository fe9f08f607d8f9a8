//! Rule configuration errors
//!
//! A broken rule table is a startup failure: the engine refuses to run
//! against a table it cannot prove terminates.

use thiserror::Error;

/// Result type for rule configuration
pub type RulesResult<T> = Result<T, RulesError>;

/// Errors raised while loading or validating a rule book
#[derive(Debug, Error)]
pub enum RulesError {
    /// Rule file could not be read
    #[error("failed to read rule file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Rule file is not valid JSON for a rule book
    #[error("malformed rule file {path}: {reason}")]
    Malformed { path: String, reason: String },

    /// Table is structurally unsound (dangling target, cycle, bad threshold)
    #[error("invalid rule table: {0}")]
    Invalid(String),
}

impl RulesError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }

    /// Stable machine code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "RULES_IO",
            Self::Malformed { .. } => "RULES_MALFORMED",
            Self::Invalid(_) => "RULES_INVALID",
        }
    }
}
