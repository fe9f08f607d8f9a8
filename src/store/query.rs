//! Typed queries over the record store
//!
//! A `Query` is a conjunction of optional predicates plus sort and limit.
//! Flags apply per variant: `consumed` matches behavioral and reward
//! records, `delivered` matches demerits and rewards. A flag set on a
//! variant that does not carry it excludes that variant.

use chrono::NaiveDate;

use crate::model::{RecordId, RecordType, Semester, StoredRecord};

/// Which variant of `StoredRecord` to match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Behavioral,
    Demerit,
    Reward,
}

/// Sort order over the record date. Unsorted queries return records in
/// insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    DateAsc,
}

/// Filter + sort + limit for `RecordStore::find` and `count`.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub kind: Option<RecordKind>,
    pub record_type: Option<RecordType>,
    pub student: Option<String>,
    pub semester: Option<Semester>,
    pub consumed: Option<bool>,
    pub delivered: Option<bool>,
    pub derived_id: Option<RecordId>,
    pub date_on: Option<NaiveDate>,
    pub sort: Option<SortOrder>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn behavioral() -> Self {
        Self {
            kind: Some(RecordKind::Behavioral),
            ..Self::default()
        }
    }

    pub fn demerits() -> Self {
        Self {
            kind: Some(RecordKind::Demerit),
            ..Self::default()
        }
    }

    pub fn rewards() -> Self {
        Self {
            kind: Some(RecordKind::Reward),
            ..Self::default()
        }
    }

    pub fn record_type(mut self, record_type: RecordType) -> Self {
        self.record_type = Some(record_type);
        self
    }

    pub fn student(mut self, student: impl Into<String>) -> Self {
        self.student = Some(student.into());
        self
    }

    pub fn semester(mut self, semester: &Semester) -> Self {
        self.semester = Some(semester.clone());
        self
    }

    pub fn consumed(mut self, consumed: bool) -> Self {
        self.consumed = Some(consumed);
        self
    }

    pub fn delivered(mut self, delivered: bool) -> Self {
        self.delivered = Some(delivered);
        self
    }

    pub fn derived_id(mut self, id: RecordId) -> Self {
        self.derived_id = Some(id);
        self
    }

    pub fn date_on(mut self, date: NaiveDate) -> Self {
        self.date_on = Some(date);
        self
    }

    pub fn sort(mut self, order: SortOrder) -> Self {
        self.sort = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a record satisfies every set predicate.
    pub fn matches(&self, record: &StoredRecord) -> bool {
        if let Some(kind) = self.kind {
            let actual = match record {
                StoredRecord::Behavioral(_) => RecordKind::Behavioral,
                StoredRecord::Demerit(_) => RecordKind::Demerit,
                StoredRecord::Reward(_) => RecordKind::Reward,
            };
            if actual != kind {
                return false;
            }
        }
        if let Some(t) = self.record_type {
            match record.as_behavioral() {
                Some(b) if b.record_type == t => {}
                _ => return false,
            }
        }
        if let Some(student) = &self.student {
            if record.student() != student {
                return false;
            }
        }
        if let Some(semester) = &self.semester {
            if record.semester() != semester {
                return false;
            }
        }
        if let Some(consumed) = self.consumed {
            let actual = match record {
                StoredRecord::Behavioral(b) => b.consumed,
                StoredRecord::Reward(r) => r.consumed,
                StoredRecord::Demerit(_) => return false,
            };
            if actual != consumed {
                return false;
            }
        }
        if let Some(delivered) = self.delivered {
            let actual = match record {
                StoredRecord::Demerit(d) => d.delivered,
                StoredRecord::Reward(r) => r.delivered,
                StoredRecord::Behavioral(_) => return false,
            };
            if actual != delivered {
                return false;
            }
        }
        if let Some(derived_id) = self.derived_id {
            match record.as_behavioral() {
                Some(b) if b.derived_id == Some(derived_id) => {}
                _ => return false,
            }
        }
        if let Some(date) = self.date_on {
            if record.date() != date {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BehavioralRecord;

    fn tardy(student: &str, semester: &str, day: u32) -> StoredRecord {
        StoredRecord::Behavioral(BehavioralRecord::new(
            RecordType::Tardy,
            student,
            "10A",
            Semester::new(semester),
            "Ms Wong",
            NaiveDate::from_ymd_opt(2025, 9, day).unwrap(),
            None,
        ))
    }

    #[test]
    fn test_kind_and_type_predicates() {
        let record = tardy("Li", "2025 Fall", 1);
        assert!(Query::behavioral().matches(&record));
        assert!(!Query::demerits().matches(&record));
        assert!(Query::behavioral()
            .record_type(RecordType::Tardy)
            .matches(&record));
        assert!(!Query::behavioral()
            .record_type(RecordType::DormTrash)
            .matches(&record));
    }

    #[test]
    fn test_semester_predicate_is_exact() {
        let record = tardy("Li", "2025 Fall", 1);
        let fall = Semester::new("2025 Fall");
        let spring = Semester::new("2026 Spring");
        assert!(Query::behavioral().semester(&fall).matches(&record));
        assert!(!Query::behavioral().semester(&spring).matches(&record));
    }

    #[test]
    fn test_flag_excludes_variants_that_do_not_carry_it() {
        // `delivered` can never match a behavioral record
        let record = tardy("Li", "2025 Fall", 1);
        assert!(!Query::default().delivered(false).matches(&record));
    }

    #[test]
    fn test_date_on_predicate() {
        let record = tardy("Li", "2025 Fall", 3);
        let on = NaiveDate::from_ymd_opt(2025, 9, 3).unwrap();
        let off = NaiveDate::from_ymd_opt(2025, 9, 4).unwrap();
        assert!(Query::behavioral().date_on(on).matches(&record));
        assert!(!Query::behavioral().date_on(off).matches(&record));
    }
}
