//! Per-key serialization for count-then-act sequences
//!
//! Accumulation and exchange read a count, decide, then write. Two
//! concurrent insertions for the same (student, semester, type) key must
//! not both observe the pre-write count, so each key owns a mutex and
//! the whole sequence runs under it. Keys for different students,
//! semesters, or types never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::model::{RecordType, Semester};

/// Accumulation scope key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct AccumKey {
    pub student: String,
    pub semester: Semester,
    pub record_type: RecordType,
}

/// Registry of per-key mutexes. Entries are created on first use and
/// kept for the registry's lifetime; the key space is bounded by the
/// active student body.
#[derive(Default)]
pub(crate) struct KeyLocks {
    locks: Mutex<HashMap<AccumKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex for this key, creating it if needed.
    pub fn handle(&self, key: AccumKey) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(key).or_default().clone()
    }
}

/// Locks the guard, recovering from a poisoned mutex (a panicked holder
/// cannot leave the unit guard in a bad state).
pub(crate) fn lock_guard(handle: &Mutex<()>) -> MutexGuard<'_, ()> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}
