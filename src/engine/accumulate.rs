//! Accumulation: folding full batches of source records into derived ones
//!
//! The interpreter walks the rule table. A `Demerit` outcome mints one
//! demerit from the oldest full batch; an `Intermediate` outcome mints a
//! record of another accumulating type and re-enters the interpreter on
//! that type; a `RewardHint` outcome only reports eligibility.
//!
//! Each hop runs under the lock for its own (student, semester, type)
//! key, so the count-then-consume sequence is atomic per key. The rule
//! table is validated acyclic, so a chain of hops never re-acquires a
//! key it already holds.

use crate::clock::Clock;
use crate::model::{
    BehavioralRecord, Demerit, RecordId, RecordType, Semester, StoredRecord,
};
use crate::notify::NotificationSender;
use crate::observability::{log, Severity};
use crate::rules::{ChainRule, RuleOutcome};
use crate::store::{Query, RecordStore, SortOrder};

use super::errors::EngineResult;
use super::keylock::lock_guard;
use super::{RuleEngine, SYSTEM_PREFIX};

/// What one accumulation pass (including chained hops) produced.
#[derive(Debug, Default)]
pub(crate) struct AccumulationResult {
    /// Demerits minted, across all hops
    pub demerits: usize,
    /// Redemption eligibility, phrased for the caller
    pub hint: Option<String>,
}

impl<S, C, N> RuleEngine<S, C, N>
where
    S: RecordStore,
    C: Clock,
    N: NotificationSender,
{
    /// Runs the rule table for one (student, semester, type) key.
    /// No-op when the type has no rule or the pool is below threshold.
    pub(crate) fn accumulate(
        &self,
        student: &str,
        class: &str,
        semester: &Semester,
        record_type: RecordType,
    ) -> EngineResult<AccumulationResult> {
        let Some(rule) = self.rules().rule_for(record_type).copied() else {
            return Ok(AccumulationResult::default());
        };

        let handle = self.locks.handle(self.key(student, semester, record_type));
        let _guard = lock_guard(&handle);
        self.accumulate_locked(student, class, semester, record_type, rule)
    }

    fn accumulate_locked(
        &self,
        student: &str,
        class: &str,
        semester: &Semester,
        record_type: RecordType,
        rule: ChainRule,
    ) -> EngineResult<AccumulationResult> {
        let pool = Query::behavioral()
            .record_type(record_type)
            .student(student)
            .semester(semester)
            .consumed(false);

        match rule.outcome {
            RuleOutcome::RewardHint => {
                let available = self.store.count(&pool)?;
                if available < rule.threshold {
                    return Ok(AccumulationResult::default());
                }
                let redeemable = available / rule.threshold;
                Ok(AccumulationResult {
                    demerits: 0,
                    hint: Some(format!(
                        "{available} unconsumed {record_type} records: \
                         eligible to exchange for {redeemable} reward credit(s)"
                    )),
                })
            }
            RuleOutcome::Demerit { source } => {
                // One fetch decides the threshold check and supplies the
                // batch, so the decision and the claim see the same pool.
                let batch = self.oldest_batch(&pool, rule.threshold)?;
                if batch.len() < rule.threshold {
                    return Ok(AccumulationResult::default());
                }
                let demerit = Demerit::new(
                    student,
                    class,
                    semester.clone(),
                    format!("{SYSTEM_PREFIX} accumulated {record_type}"),
                    self.clock.today(),
                    Some(format!("accumulated {} x {record_type}", rule.threshold)),
                    source,
                );
                let demerit_id = demerit.id;
                self.store.insert(StoredRecord::Demerit(demerit))?;
                if !self.consume_batch(&batch, demerit_id)? {
                    self.abort_derivation(demerit_id, &batch)?;
                    return Ok(AccumulationResult::default());
                }

                log(
                    Severity::Info,
                    "demerit_derived",
                    &[
                        ("student", student.to_string()),
                        ("semester", semester.to_string()),
                        ("source_type", record_type.to_string()),
                        ("demerit_id", demerit_id.to_string()),
                    ],
                );
                Ok(AccumulationResult {
                    demerits: 1,
                    hint: None,
                })
            }
            RuleOutcome::Intermediate { target } => {
                let batch = self.oldest_batch(&pool, rule.threshold)?;
                if batch.len() < rule.threshold {
                    return Ok(AccumulationResult::default());
                }
                let derived = BehavioralRecord::new(
                    target,
                    student,
                    class,
                    semester.clone(),
                    format!("{SYSTEM_PREFIX} accumulated {record_type}"),
                    self.clock.today(),
                    Some(format!("accumulated {} x {record_type}", rule.threshold)),
                );
                let derived_id = derived.id;
                self.store.insert(StoredRecord::Behavioral(derived))?;
                if !self.consume_batch(&batch, derived_id)? {
                    self.abort_derivation(derived_id, &batch)?;
                    return Ok(AccumulationResult::default());
                }

                log(
                    Severity::Info,
                    "chain_derived",
                    &[
                        ("student", student.to_string()),
                        ("semester", semester.to_string()),
                        ("source_type", record_type.to_string()),
                        ("target_type", target.to_string()),
                        ("derived_id", derived_id.to_string()),
                    ],
                );

                // Re-enter on the derived type; it takes its own key lock.
                self.accumulate(student, class, semester, target)
            }
        }
    }

    /// The oldest `threshold` records of the pool, date ascending with
    /// insertion order breaking ties.
    fn oldest_batch(&self, pool: &Query, threshold: usize) -> EngineResult<Vec<StoredRecord>> {
        let batch = self
            .store
            .find(&pool.clone().sort(SortOrder::DateAsc).limit(threshold))?;
        Ok(batch)
    }

    /// Marks every record of a batch consumed, pointing at the derived
    /// record. Returns false as soon as one record was already claimed
    /// elsewhere; the caller must then abort the derivation.
    fn consume_batch(&self, batch: &[StoredRecord], derived_id: RecordId) -> EngineResult<bool> {
        for record in batch {
            let applied = self.store.update(record.id(), &mut |stored| match stored {
                StoredRecord::Behavioral(b) if !b.consumed => {
                    b.consumed = true;
                    b.derived_id = Some(derived_id);
                    true
                }
                _ => false,
            })?;
            if !applied {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Unwinds a derivation whose batch could not be fully claimed:
    /// releases the records already marked and deletes the minted
    /// derived record. Nothing under-justified stays behind.
    fn abort_derivation(
        &self,
        derived_id: RecordId,
        batch: &[StoredRecord],
    ) -> EngineResult<()> {
        for record in batch {
            self.store.update(record.id(), &mut |stored| match stored {
                StoredRecord::Behavioral(b) if b.derived_id == Some(derived_id) => {
                    b.consumed = false;
                    b.derived_id = None;
                    true
                }
                _ => false,
            })?;
        }
        self.store.delete(derived_id)?;
        log(
            Severity::Warn,
            "derivation_aborted",
            &[
                ("derived_id", derived_id.to_string()),
                ("batch", batch.len().to_string()),
            ],
        );
        Ok(())
    }
}
