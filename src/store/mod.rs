//! Record store abstraction
//!
//! The engine talks to persistence through the `RecordStore` trait:
//! insert, point lookup, filtered find/count, conditional in-place update,
//! and delete. Correctness of the rule engine depends on the conditional
//! update ("apply only while the predicate still holds") being atomic per
//! record; `MemoryStore` provides that under a single store-wide mutex.

mod errors;
mod memory;
mod query;
mod snapshot;

pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use query::{Query, RecordKind, SortOrder};

use crate::model::{RecordId, StoredRecord};

/// Persistent record store used by every engine component.
pub trait RecordStore: Send + Sync {
    /// Inserts a record, returning its id.
    fn insert(&self, record: StoredRecord) -> StoreResult<RecordId>;

    /// Fetches one record by id.
    fn get(&self, id: RecordId) -> StoreResult<Option<StoredRecord>>;

    /// Returns all records matching the query, in query order.
    ///
    /// Results are deterministic: date sort is stable, and ties fall back
    /// to insertion order.
    fn find(&self, query: &Query) -> StoreResult<Vec<StoredRecord>>;

    /// Counts records matching the query.
    fn count(&self, query: &Query) -> StoreResult<usize>;

    /// Atomically applies `mutate` to the record with this id.
    ///
    /// The closure returns `true` to commit its changes or `false` to
    /// decline (conditional update: the caller re-checks its predicate
    /// inside the closure). Returns whether a commit happened; `Ok(false)`
    /// also covers a missing id.
    fn update(
        &self,
        id: RecordId,
        mutate: &mut dyn FnMut(&mut StoredRecord) -> bool,
    ) -> StoreResult<bool>;

    /// Deletes one record. Returns whether it existed.
    fn delete(&self, id: RecordId) -> StoreResult<bool>;
}
