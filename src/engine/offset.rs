//! Offsetting demerits with reward credits
//!
//! Runs once after each reward-credit insertion and attaches that credit
//! to the single best target demerit. Candidates are the student's
//! undelivered demerits for the semester, oldest first; within them the
//! tier order depends on the credit's spending preference:
//!
//! prefer execution:        prefer record write-off:
//!   1. unexecuted, 1 credit   1. unoffset, 2 credits
//!   2. unexecuted             2. unoffset, 1 credit
//!   3. unoffset, 2 credits    3. unoffset
//!   4. unoffset, 1 credit
//!   5. unoffset
//!
//! The second attached credit clears execution; the third writes the
//! record off. Demerits already holding three credits are never targets.

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::model::{Demerit, RecordId, RecordType, Semester, StoredRecord, REWARD_LIST_CAP};
use crate::notify::NotificationSender;
use crate::observability::{log, Severity};
use crate::store::{Query, RecordStore, SortOrder};

use super::errors::{EngineError, EngineResult};
use super::keylock::lock_guard;
use super::RuleEngine;

/// How an offset pass resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetOutcome {
    /// The demerit the credit attached to
    pub demerit_id: RecordId,
    /// Credits on that demerit after this pass
    pub rewards_attached: usize,
    /// This pass cleared the demerit's execution
    pub executed_now: bool,
    /// This pass wrote the record off
    pub record_offset_now: bool,
}

/// Picks the best target among candidates already filtered to one
/// student, one semester, undelivered, oldest first.
fn select_target(candidates: &[Demerit], prefer_execution: bool) -> Option<RecordId> {
    let open: Vec<&Demerit> = candidates
        .iter()
        .filter(|d| d.reward_ids.len() < REWARD_LIST_CAP)
        .collect();
    let pick = |tier: fn(&Demerit) -> bool| open.iter().find(|d| tier(d)).map(|d| d.id);

    if prefer_execution {
        pick(|d| !d.executed && d.reward_ids.len() == 1)
            .or_else(|| pick(|d| !d.executed))
            .or_else(|| pick(|d| !d.record_offset && d.reward_ids.len() == 2))
            .or_else(|| pick(|d| !d.record_offset && d.reward_ids.len() == 1))
            .or_else(|| pick(|d| !d.record_offset))
    } else {
        pick(|d| !d.record_offset && d.reward_ids.len() == 2)
            .or_else(|| pick(|d| !d.record_offset && d.reward_ids.len() == 1))
            .or_else(|| pick(|d| !d.record_offset))
    }
}

impl<S, C, N> RuleEngine<S, C, N>
where
    S: RecordStore,
    C: Clock,
    N: NotificationSender,
{
    /// Attaches one unconsumed reward credit to its best target demerit.
    /// Returns `None` when the credit is already spent or no open
    /// demerit exists; the credit then stays banked for a later pass.
    pub(crate) fn run_offset(&self, credit_id: RecordId) -> EngineResult<Option<OffsetOutcome>> {
        let credit = self
            .store
            .get(credit_id)?
            .and_then(|r| r.as_reward().cloned())
            .ok_or(EngineError::NotFound(credit_id))?;
        if credit.consumed {
            return Ok(None);
        }

        // Serialize offset passes per student and semester so two
        // concurrent credits cannot pick the same attachment slot.
        let handle = self
            .locks
            .handle(self.key(&credit.student, &credit.semester, RecordType::Reward));
        let _guard = lock_guard(&handle);

        let candidates: Vec<Demerit> = self
            .store
            .find(
                &Query::demerits()
                    .student(&credit.student)
                    .semester(&credit.semester)
                    .delivered(false)
                    .sort(SortOrder::DateAsc),
            )?
            .into_iter()
            .filter_map(|r| r.as_demerit().cloned())
            .collect();

        let Some(target_id) = select_target(&candidates, credit.prefer_execution) else {
            return Ok(None);
        };

        let now = self.clock.now();
        let mut outcome = None;
        let applied = self.store.update(target_id, &mut |stored| {
            attach_credit(stored, credit_id, now, &mut outcome)
        })?;
        if !applied {
            // Target mutated between select and attach; leave the
            // credit banked rather than re-search under contention.
            return Ok(None);
        }

        self.store.update(credit_id, &mut |stored| match stored {
            StoredRecord::Reward(r) if !r.consumed => {
                r.consumed = true;
                r.offset_demerit_id = Some(target_id);
                true
            }
            _ => false,
        })?;

        let outcome = outcome.unwrap_or(OffsetOutcome {
            demerit_id: target_id,
            rewards_attached: 0,
            executed_now: false,
            record_offset_now: false,
        });
        log(
            Severity::Info,
            "demerit_offset",
            &[
                ("student", credit.student.clone()),
                ("semester", credit.semester.to_string()),
                ("credit_id", credit_id.to_string()),
                ("demerit_id", target_id.to_string()),
                ("rewards_attached", outcome.rewards_attached.to_string()),
                ("executed_now", outcome.executed_now.to_string()),
                ("record_offset_now", outcome.record_offset_now.to_string()),
            ],
        );
        Ok(Some(outcome))
    }

    /// Whether the student has any demerit a reward credit could ever
    /// apply to this semester. Gate for reward-credit ingestion.
    pub(crate) fn has_eligible_demerit(
        &self,
        student: &str,
        semester: &Semester,
    ) -> EngineResult<bool> {
        let demerits = self
            .store
            .find(&Query::demerits().student(student).semester(semester))?;
        Ok(demerits
            .iter()
            .filter_map(StoredRecord::as_demerit)
            .any(Demerit::unresolved))
    }
}

/// Update closure body for the target demerit. Re-checks the slot under
/// the store's lock and records what this attachment changed.
fn attach_credit(
    stored: &mut StoredRecord,
    credit_id: RecordId,
    now: DateTime<Utc>,
    outcome: &mut Option<OffsetOutcome>,
) -> bool {
    let StoredRecord::Demerit(d) = stored else {
        return false;
    };
    if d.delivered || d.reward_ids.len() >= REWARD_LIST_CAP || d.reward_ids.contains(&credit_id) {
        return false;
    }

    d.reward_ids.push(credit_id);
    let mut executed_now = false;
    let mut record_offset_now = false;
    if d.reward_ids.len() == 2 && !d.executed {
        d.executed = true;
        d.executed_at = Some(now);
        executed_now = true;
    }
    if d.reward_ids.len() == REWARD_LIST_CAP {
        record_offset_now = !d.record_offset;
        d.record_offset = true;
        d.executed = true;
    }
    *outcome = Some(OffsetOutcome {
        demerit_id: d.id,
        rewards_attached: d.reward_ids.len(),
        executed_now,
        record_offset_now,
    });
    true
}
