//! In-memory record store
//!
//! Canonical backend for tests and single-process deployments. All state
//! sits behind one mutex, so every trait method is an atomic step; in
//! particular the conditional `update` closure runs entirely inside the
//! lock, which is what the engine's "mark consumed only if still
//! unconsumed" writes rely on.
//!
//! Iteration follows insertion order, giving `find` its deterministic
//! tie-break for equal dates.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::model::{RecordId, StoredRecord};

use super::errors::StoreResult;
use super::query::{Query, SortOrder};
use super::snapshot;
use super::RecordStore;

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    /// Records in insertion order
    by_seq: BTreeMap<u64, StoredRecord>,
    /// Point-lookup index
    by_id: HashMap<RecordId, u64>,
}

/// Mutex-guarded in-memory store with optional snapshot persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the full store contents to a checksum-guarded snapshot file.
    pub fn save_snapshot(&self, path: &Path) -> StoreResult<()> {
        let inner = self.lock();
        let records: Vec<&StoredRecord> = inner.by_seq.values().collect();
        snapshot::write(path, &records)
    }

    /// Rebuilds a store from a snapshot file.
    ///
    /// A checksum mismatch or unparseable body refuses to load rather
    /// than serving partial state.
    pub fn load_snapshot(path: &Path) -> StoreResult<Self> {
        let records = snapshot::read(path)?;
        let store = Self::new();
        {
            let mut inner = store.lock();
            for record in records {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner.by_id.insert(record.id(), seq);
                inner.by_seq.insert(seq, record);
            }
        }
        Ok(store)
    }

    /// Number of records currently held (any kind)
    pub fn len(&self) -> usize {
        self.lock().by_seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn select(inner: &Inner, query: &Query) -> Vec<StoredRecord> {
        let mut matched: Vec<StoredRecord> = inner
            .by_seq
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();

        // Stable sort keeps insertion order within equal dates
        if query.sort == Some(SortOrder::DateAsc) {
            matched.sort_by_key(|r| r.date());
        }

        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        matched
    }
}

impl RecordStore for MemoryStore {
    fn insert(&self, record: StoredRecord) -> StoreResult<RecordId> {
        let id = record.id();
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.by_id.insert(id, seq);
        inner.by_seq.insert(seq, record);
        Ok(id)
    }

    fn get(&self, id: RecordId) -> StoreResult<Option<StoredRecord>> {
        let inner = self.lock();
        Ok(inner
            .by_id
            .get(&id)
            .and_then(|seq| inner.by_seq.get(seq))
            .cloned())
    }

    fn find(&self, query: &Query) -> StoreResult<Vec<StoredRecord>> {
        Ok(Self::select(&self.lock(), query))
    }

    fn count(&self, query: &Query) -> StoreResult<usize> {
        // Count ignores limit: it answers "how many exist", not "how many
        // a page would return".
        let inner = self.lock();
        Ok(inner.by_seq.values().filter(|r| query.matches(r)).count())
    }

    fn update(
        &self,
        id: RecordId,
        mutate: &mut dyn FnMut(&mut StoredRecord) -> bool,
    ) -> StoreResult<bool> {
        let mut inner = self.lock();
        let Some(seq) = inner.by_id.get(&id).copied() else {
            return Ok(false);
        };
        let Some(record) = inner.by_seq.get_mut(&seq) else {
            return Ok(false);
        };
        let mut candidate = record.clone();
        if mutate(&mut candidate) {
            *record = candidate;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn delete(&self, id: RecordId) -> StoreResult<bool> {
        let mut inner = self.lock();
        match inner.by_id.remove(&id) {
            Some(seq) => {
                inner.by_seq.remove(&seq);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
