//! Record data model
//!
//! One tagged union (`StoredRecord`) covers everything the store holds:
//! raw behavioral records, derived demerits, and reward credits. Each
//! variant carries only its own fields.

mod record;
mod types;

pub(crate) use record::REWARD_LIST_CAP;
pub use record::{BehavioralRecord, Demerit, RewardCredit, StoredRecord};
pub use types::{RecordId, RecordType, Semester, SourceCategory};
