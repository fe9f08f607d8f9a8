//! The behavioral-record rule engine
//!
//! Operations are short-lived units of work against the shared record
//! store: ingest, exchange, withdraw, execute, deliver. Components never
//! talk to each other except through stored state.
//!
//! Execution flow for one ingestion:
//! 1. Validate the type tag and the daily-uniqueness constraint
//! 2. Insert the base record and dispatch by category
//! 3. Accumulation (possibly recursive through the chain table)
//! 4. Offset pass when the record is a reward credit
//! 5. Best-effort homeroom notification

mod accumulate;
mod delivery;
mod errors;
mod exchange;
mod ingest;
mod keylock;
mod offset;
mod withdraw;

pub use errors::{EngineError, EngineResult};
pub use exchange::{ExchangeOutcome, ExchangeRequest};
pub use ingest::{IngestOutcome, IngestRequest};
pub use offset::OffsetOutcome;
pub use withdraw::{Requester, WithdrawalOutcome};

use keylock::{AccumKey, KeyLocks};

use crate::clock::Clock;
use crate::model::{RecordType, Semester};
use crate::notify::NotificationSender;
use crate::rules::RuleBook;
use crate::store::RecordStore;

/// Prefix on `recorded_by` for records the engine mints itself.
/// Stripped before author matching during withdrawal authorization.
pub const SYSTEM_PREFIX: &str = "system:";

/// Removes the machine-generated author prefix, if present.
pub(crate) fn strip_system_prefix(recorded_by: &str) -> &str {
    recorded_by
        .strip_prefix(SYSTEM_PREFIX)
        .unwrap_or(recorded_by)
        .trim_start()
}

/// Rule engine over a record store, a clock, and a notification channel.
pub struct RuleEngine<S, C, N> {
    store: S,
    clock: C,
    notifier: N,
    rules: RuleBook,
    locks: KeyLocks,
}

impl<S, C, N> RuleEngine<S, C, N>
where
    S: RecordStore,
    C: Clock,
    N: NotificationSender,
{
    /// Engine with the standard production rule table.
    pub fn new(store: S, clock: C, notifier: N) -> Self {
        Self::with_rules(store, clock, notifier, RuleBook::standard())
    }

    /// Engine with a custom (already validated) rule table.
    pub fn with_rules(store: S, clock: C, notifier: N, rules: RuleBook) -> Self {
        Self {
            store,
            clock,
            notifier,
            rules,
            locks: KeyLocks::new(),
        }
    }

    /// The underlying store, for read-side callers.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The active rule table.
    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    pub(crate) fn key(
        &self,
        student: &str,
        semester: &Semester,
        record_type: RecordType,
    ) -> AccumKey {
        AccumKey {
            student: student.to_string(),
            semester: semester.clone(),
            record_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_system_prefix() {
        assert_eq!(strip_system_prefix("system: accumulated tardy"), "accumulated tardy");
        assert_eq!(strip_system_prefix("Ms Wong"), "Ms Wong");
        assert_eq!(strip_system_prefix("system:exchange"), "exchange");
    }
}
