//! Stored record variants
//!
//! The consumption link is encoded on the source side: a consumed source
//! carries `consumed = true` and `derived_id = Some(target)`. A derived
//! record never points back at its batch; the batch is recovered by
//! querying for its id.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::types::{RecordId, RecordType, Semester, SourceCategory};

/// Maximum reward credits that can be associated with one demerit.
/// Two clear its execution, the third writes the record off.
pub(crate) const REWARD_LIST_CAP: usize = 3;

/// One raw observed event, possibly folded into a derived record later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehavioralRecord {
    pub id: RecordId,
    pub record_type: RecordType,
    pub student: String,
    pub class: String,
    pub semester: Semester,
    /// Who recorded it; engine-minted records carry a `system:` prefix
    pub recorded_by: String,
    pub date: NaiveDate,
    pub reason: Option<String>,
    /// True once this record was folded into a derived record
    pub consumed: bool,
    /// The derived record this one was folded into
    pub derived_id: Option<RecordId>,
}

/// A derived disciplinary demerit (FAD).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demerit {
    pub id: RecordId,
    pub student: String,
    pub class: String,
    pub semester: Semester,
    pub recorded_by: String,
    pub date: NaiveDate,
    pub reason: Option<String>,
    pub source: SourceCategory,
    /// Enforced, or cleared by two reward credits
    pub executed: bool,
    pub executed_at: Option<DateTime<Utc>>,
    /// Fully written off by three reward credits
    pub record_offset: bool,
    /// Associated reward credits, in association order, capped at 3
    pub reward_ids: Vec<RecordId>,
    /// Paper notice handed out; terminal, blocks withdrawal
    pub delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub delivered_by: Option<String>,
}

impl Demerit {
    /// True while the demerit can still absorb reward credits
    pub fn unresolved(&self) -> bool {
        !self.delivered && (!self.executed || !self.record_offset)
    }
}

/// A positive-behavior credit that can be spent against demerits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCredit {
    pub id: RecordId,
    pub student: String,
    pub class: String,
    pub semester: Semester,
    pub recorded_by: String,
    pub date: NaiveDate,
    pub reason: Option<String>,
    /// True: spend on clearing execution first; false: spend on the record
    pub prefer_execution: bool,
    /// True once spent against a demerit
    pub consumed: bool,
    pub offset_demerit_id: Option<RecordId>,
    pub delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub delivered_by: Option<String>,
}

/// Everything the record store holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredRecord {
    Behavioral(BehavioralRecord),
    Demerit(Demerit),
    Reward(RewardCredit),
}

impl StoredRecord {
    pub fn id(&self) -> RecordId {
        match self {
            Self::Behavioral(r) => r.id,
            Self::Demerit(r) => r.id,
            Self::Reward(r) => r.id,
        }
    }

    pub fn student(&self) -> &str {
        match self {
            Self::Behavioral(r) => &r.student,
            Self::Demerit(r) => &r.student,
            Self::Reward(r) => &r.student,
        }
    }

    pub fn semester(&self) -> &Semester {
        match self {
            Self::Behavioral(r) => &r.semester,
            Self::Demerit(r) => &r.semester,
            Self::Reward(r) => &r.semester,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Behavioral(r) => r.date,
            Self::Demerit(r) => r.date,
            Self::Reward(r) => r.date,
        }
    }

    pub fn recorded_by(&self) -> &str {
        match self {
            Self::Behavioral(r) => &r.recorded_by,
            Self::Demerit(r) => &r.recorded_by,
            Self::Reward(r) => &r.recorded_by,
        }
    }

    pub fn as_behavioral(&self) -> Option<&BehavioralRecord> {
        match self {
            Self::Behavioral(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_demerit(&self) -> Option<&Demerit> {
        match self {
            Self::Demerit(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_reward(&self) -> Option<&RewardCredit> {
        match self {
            Self::Reward(r) => Some(r),
            _ => None,
        }
    }
}

impl BehavioralRecord {
    /// Builds an unconsumed record for the given event
    pub fn new(
        record_type: RecordType,
        student: impl Into<String>,
        class: impl Into<String>,
        semester: Semester,
        recorded_by: impl Into<String>,
        date: NaiveDate,
        reason: Option<String>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            record_type,
            student: student.into(),
            class: class.into(),
            semester,
            recorded_by: recorded_by.into(),
            date,
            reason,
            consumed: false,
            derived_id: None,
        }
    }
}

impl Demerit {
    /// Builds an open demerit with an empty reward list
    pub fn new(
        student: impl Into<String>,
        class: impl Into<String>,
        semester: Semester,
        recorded_by: impl Into<String>,
        date: NaiveDate,
        reason: Option<String>,
        source: SourceCategory,
    ) -> Self {
        Self {
            id: RecordId::new(),
            student: student.into(),
            class: class.into(),
            semester,
            recorded_by: recorded_by.into(),
            date,
            reason,
            source,
            executed: false,
            executed_at: None,
            record_offset: false,
            reward_ids: Vec::new(),
            delivered: false,
            delivered_at: None,
            delivered_by: None,
        }
    }
}

impl RewardCredit {
    /// Builds an unconsumed reward credit
    pub fn new(
        student: impl Into<String>,
        class: impl Into<String>,
        semester: Semester,
        recorded_by: impl Into<String>,
        date: NaiveDate,
        reason: Option<String>,
        prefer_execution: bool,
    ) -> Self {
        Self {
            id: RecordId::new(),
            student: student.into(),
            class: class.into(),
            semester,
            recorded_by: recorded_by.into(),
            date,
            reason,
            prefer_execution,
            consumed: false,
            offset_demerit_id: None,
            delivered: false,
            delivered_at: None,
            delivered_by: None,
        }
    }
}
