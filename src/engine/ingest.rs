//! Record ingestion and dispatch
//!
//! Every record enters through `ingest`. Validation happens before any
//! write; the dispatch after the base insert depends on the type's
//! category in the rule table:
//!
//! - direct-demerit types mint a demerit immediately and mark the base
//!   record consumed by it
//! - `reward` requires an eligible demerit, then runs an offset pass
//! - accumulating types run the accumulation interpreter
//! - anything else is stored as-is

use chrono::NaiveDate;

use crate::clock::Clock;
use crate::model::{
    BehavioralRecord, Demerit, RecordId, RecordType, RewardCredit, Semester, SourceCategory,
    StoredRecord,
};
use crate::notify::{NotificationSender, RecordNotice};
use crate::observability::{log, Severity};
use crate::store::{Query, RecordStore};

use super::errors::{EngineError, EngineResult};
use super::offset::OffsetOutcome;
use super::{RuleEngine, SYSTEM_PREFIX};

/// One observed event, as the outer API hands it over.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Type tag, e.g. `"tardy"`; unknown tags are rejected
    pub record_type: String,
    pub student: String,
    pub class: String,
    pub semester: Semester,
    pub recorded_by: String,
    pub date: NaiveDate,
    pub reason: Option<String>,
    /// Source category for a directly ingested demerit; defaults to `other`
    pub source: Option<SourceCategory>,
    /// Spending preference for a reward credit
    pub prefer_execution: bool,
}

/// What one ingestion did beyond storing the record.
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    /// Id of the stored base record
    pub record_id: RecordId,
    /// Demerits minted by accumulation or direct synthesis
    pub derived_demerits: usize,
    /// Redemption eligibility hint, when a threshold was crossed
    pub hint: Option<String>,
    /// Offset resolution, when the record was a reward credit
    pub offset: Option<OffsetOutcome>,
}

impl<S, C, N> RuleEngine<S, C, N>
where
    S: RecordStore,
    C: Clock,
    N: NotificationSender,
{
    /// Validates, stores, and dispatches one record.
    pub fn ingest(&self, request: IngestRequest) -> EngineResult<IngestOutcome> {
        let record_type = RecordType::parse(&request.record_type)
            .ok_or_else(|| EngineError::InvalidRecordType(request.record_type.clone()))?;

        if self.rules().is_daily_unique(record_type) {
            let today = self
                .store
                .count(
                    &Query::behavioral()
                        .record_type(record_type)
                        .student(&request.student)
                        .date_on(request.date),
                )?;
            if today > 0 {
                return Err(EngineError::DuplicateDailyRecord {
                    record_type,
                    date: request.date,
                });
            }
        }

        let outcome = match record_type {
            RecordType::Demerit => self.ingest_demerit(&request)?,
            RecordType::Reward => self.ingest_reward(&request)?,
            _ => match self.rules().direct_demerit(record_type) {
                Some(source) => self.ingest_direct(&request, record_type, source)?,
                None => self.ingest_behavioral(&request, record_type)?,
            },
        };

        log(
            Severity::Info,
            "record_ingested",
            &[
                ("record_id", outcome.record_id.to_string()),
                ("record_type", record_type.to_string()),
                ("student", request.student.clone()),
                ("semester", request.semester.to_string()),
                ("derived_demerits", outcome.derived_demerits.to_string()),
            ],
        );
        if self.rules().notifies(record_type) {
            self.notify(&request, record_type);
        }
        Ok(outcome)
    }

    /// A demerit handed over directly by staff.
    fn ingest_demerit(&self, request: &IngestRequest) -> EngineResult<IngestOutcome> {
        let demerit = Demerit::new(
            &request.student,
            &request.class,
            request.semester.clone(),
            &request.recorded_by,
            request.date,
            request.reason.clone(),
            request.source.unwrap_or(SourceCategory::Other),
        );
        let record_id = demerit.id;
        self.store.insert(StoredRecord::Demerit(demerit))?;
        Ok(IngestOutcome {
            record_id,
            ..IngestOutcome::default()
        })
    }

    /// A reward credit; rejected when the student has nothing to offset.
    fn ingest_reward(&self, request: &IngestRequest) -> EngineResult<IngestOutcome> {
        if !self.has_eligible_demerit(&request.student, &request.semester)? {
            return Err(EngineError::NoEligibleDemerit);
        }
        let credit = RewardCredit::new(
            &request.student,
            &request.class,
            request.semester.clone(),
            &request.recorded_by,
            request.date,
            request.reason.clone(),
            request.prefer_execution,
        );
        let record_id = credit.id;
        self.store.insert(StoredRecord::Reward(credit))?;
        let offset = self.run_offset(record_id)?;
        Ok(IngestOutcome {
            record_id,
            offset,
            ..IngestOutcome::default()
        })
    }

    /// A type that converts one-to-one into a demerit. The base record
    /// is stored already consumed, linked to the demerit it triggered.
    fn ingest_direct(
        &self,
        request: &IngestRequest,
        record_type: RecordType,
        source: SourceCategory,
    ) -> EngineResult<IngestOutcome> {
        let demerit = Demerit::new(
            &request.student,
            &request.class,
            request.semester.clone(),
            format!("{SYSTEM_PREFIX} {record_type} by {}", request.recorded_by),
            request.date,
            request.reason.clone(),
            source,
        );
        let demerit_id = demerit.id;

        let mut base = BehavioralRecord::new(
            record_type,
            &request.student,
            &request.class,
            request.semester.clone(),
            &request.recorded_by,
            request.date,
            request.reason.clone(),
        );
        base.consumed = true;
        base.derived_id = Some(demerit_id);
        let record_id = base.id;

        self.store.insert(StoredRecord::Behavioral(base))?;
        self.store.insert(StoredRecord::Demerit(demerit))?;

        log(
            Severity::Info,
            "demerit_derived",
            &[
                ("student", request.student.clone()),
                ("semester", request.semester.to_string()),
                ("source_type", record_type.to_string()),
                ("demerit_id", demerit_id.to_string()),
            ],
        );
        Ok(IngestOutcome {
            record_id,
            derived_demerits: 1,
            ..IngestOutcome::default()
        })
    }

    /// A plain or accumulating behavioral record.
    fn ingest_behavioral(
        &self,
        request: &IngestRequest,
        record_type: RecordType,
    ) -> EngineResult<IngestOutcome> {
        let record = BehavioralRecord::new(
            record_type,
            &request.student,
            &request.class,
            request.semester.clone(),
            &request.recorded_by,
            request.date,
            request.reason.clone(),
        );
        let record_id = record.id;
        self.store.insert(StoredRecord::Behavioral(record))?;

        let folded = self.accumulate(
            &request.student,
            &request.class,
            &request.semester,
            record_type,
        )?;
        Ok(IngestOutcome {
            record_id,
            derived_demerits: folded.demerits,
            hint: folded.hint,
            offset: None,
        })
    }

    /// Fire-and-forget homeroom notification.
    fn notify(&self, request: &IngestRequest, record_type: RecordType) {
        let notice = RecordNotice {
            record_type: record_type.to_string(),
            student: request.student.clone(),
            class: request.class.clone(),
            semester: request.semester.clone(),
            recorded_by: request.recorded_by.clone(),
            date: request.date,
            reason: request.reason.clone(),
        };
        if let Err(err) = self.notifier.send(&notice) {
            log(
                Severity::Warn,
                "notify_failed",
                &[
                    ("student", request.student.clone()),
                    ("record_type", record_type.to_string()),
                    ("error", err.to_string()),
                ],
            );
        }
    }
}
