//! Withdrawal of wrongly entered records
//!
//! Deleting a source record tears down everything derived from it: the
//! intermediate record it folded into (if any) and the demerit at the
//! end of the chain. Batch siblings that were consumed by a deleted
//! derivation return to the unconsumed pool, and reward credits attached
//! to a deleted demerit are freed for a later offset pass.
//!
//! All checks run before the first delete; a delivered demerit anywhere
//! in the chain aborts the whole withdrawal.
//!
//! Withdrawal mutates the same unconsumed pools that accumulation counts,
//! so it holds the key locks for every record type its cascade can touch.
//! Keys are acquired in derivation order (sources before targets), the
//! same order the accumulation interpreter nests its own acquisitions in,
//! so the two never deadlock.

use std::collections::HashSet;

use crate::clock::Clock;
use crate::model::{RecordId, RecordType, StoredRecord};
use crate::notify::NotificationSender;
use crate::observability::{log, Severity};
use crate::rules::RuleOutcome;
use crate::store::{Query, RecordStore};

use super::errors::{EngineError, EngineResult};
use super::keylock::{lock_guard, AccumKey};
use super::{strip_system_prefix, RuleEngine};

/// Who is asking for the withdrawal.
#[derive(Debug, Clone)]
pub struct Requester {
    pub name: String,
    /// Administrators may withdraw any record
    pub is_admin: bool,
}

/// What a completed withdrawal removed and restored.
#[derive(Debug, Clone, Default)]
pub struct WithdrawalOutcome {
    /// Ids removed, the requested record included
    pub deleted: Vec<RecordId>,
    /// Batch siblings returned to the unconsumed pool
    pub siblings_reset: usize,
    /// Reward credits freed from deleted demerits
    pub rewards_freed: usize,
}

impl<S, C, N> RuleEngine<S, C, N>
where
    S: RecordStore,
    C: Clock,
    N: NotificationSender,
{
    /// Withdraws a record and cascades through its derivation chain.
    pub fn withdraw(
        &self,
        record_id: RecordId,
        requester: &Requester,
    ) -> EngineResult<WithdrawalOutcome> {
        let record = self
            .store
            .get(record_id)?
            .ok_or(EngineError::NotFound(record_id))?;

        if record.as_reward().is_some() {
            return Err(EngineError::forbidden(
                "reward credits cannot be withdrawn",
            ));
        }
        if !requester.is_admin {
            let author = strip_system_prefix(record.recorded_by());
            if requester.name.is_empty() || !author.contains(requester.name.as_str()) {
                return Err(EngineError::forbidden(
                    "only the recording teacher or an administrator may withdraw a record",
                ));
            }
        }

        // Hold the key locks for every pool the cascade can mutate, then
        // re-read the record: its derivation pointers may have moved
        // between the first read and acquisition.
        let keys = self.withdrawal_keys(&record)?;
        let handles: Vec<_> = keys
            .into_iter()
            .map(|key| self.locks.handle(key))
            .collect();
        let _guards: Vec<_> = handles.iter().map(|h| lock_guard(h)).collect();
        let record = self
            .store
            .get(record_id)?
            .ok_or(EngineError::NotFound(record_id))?;

        let chain = self.collect_chain(&record)?;
        for link in std::iter::once(&record).chain(chain.iter()) {
            if link.as_demerit().is_some_and(|d| d.delivered) {
                return Err(EngineError::forbidden(
                    "a delivered demerit is part of this record's chain",
                ));
            }
        }

        let doomed: Vec<StoredRecord> =
            std::iter::once(record).chain(chain).collect();
        let doomed_ids: HashSet<RecordId> = doomed.iter().map(|r| r.id()).collect();

        let mut siblings_reset = 0usize;
        let mut rewards_freed = 0usize;
        for target in &doomed {
            siblings_reset += self.reset_siblings(target.id(), &doomed_ids)?;
            if let Some(demerit) = target.as_demerit() {
                rewards_freed += self.free_rewards(demerit.id, &demerit.reward_ids)?;
            }
        }
        for id in &doomed_ids {
            self.store.delete(*id)?;
        }

        let deleted: Vec<RecordId> = doomed.iter().map(|r| r.id()).collect();
        log(
            Severity::Info,
            "record_withdrawn",
            &[
                ("record_id", record_id.to_string()),
                ("requester", requester.name.clone()),
                ("deleted", deleted.len().to_string()),
                ("siblings_reset", siblings_reset.to_string()),
                ("rewards_freed", rewards_freed.to_string()),
            ],
        );
        Ok(WithdrawalOutcome {
            deleted,
            siblings_reset,
            rewards_freed,
        })
    }

    /// Key locks a withdrawal must hold, in derivation order.
    ///
    /// For a behavioral record of type T the cascade can touch the pools
    /// of: every type that chains into T (siblings of a system-minted T),
    /// T itself, and T's own chain target. The rule table fixes this set,
    /// so it covers the chain regardless of how far the record has been
    /// folded by the time the locks are held. For a demerit the only
    /// pools touched are its siblings' types; a demerit's sibling set
    /// never grows after it is minted.
    fn withdrawal_keys(&self, record: &StoredRecord) -> EngineResult<Vec<AccumKey>> {
        let mut types: Vec<RecordType> = Vec::new();
        match record {
            StoredRecord::Behavioral(b) => {
                let mut sources: Vec<RecordType> = self
                    .rules()
                    .rules
                    .iter()
                    .filter_map(|(source, rule)| match rule.outcome {
                        RuleOutcome::Intermediate { target } if target == b.record_type => {
                            Some(*source)
                        }
                        _ => None,
                    })
                    .collect();
                sources.sort_by_key(|t| t.as_str());
                types.extend(sources);
                types.push(b.record_type);
                if let Some(RuleOutcome::Intermediate { target }) =
                    self.rules().rule_for(b.record_type).map(|r| r.outcome)
                {
                    types.push(target);
                }
            }
            StoredRecord::Demerit(d) => {
                let siblings = self.store.find(&Query::behavioral().derived_id(d.id))?;
                let mut sibling_types: Vec<RecordType> = siblings
                    .iter()
                    .filter_map(|s| s.as_behavioral().map(|b| b.record_type))
                    .collect();
                sibling_types.sort_by_key(|t| t.as_str());
                sibling_types.dedup();
                types.extend(sibling_types);
            }
            // Rewards are rejected before locking
            StoredRecord::Reward(_) => {}
        }
        types.dedup();
        Ok(types
            .into_iter()
            .map(|t| self.key(record.student(), record.semester(), t))
            .collect())
    }

    /// Follows `derived_id` hops from a behavioral record: at most one
    /// intermediate record, then the demerit it (or the record itself)
    /// folded into. The chain never includes reward credits; a ticket
    /// already exchanged stays exchanged.
    fn collect_chain(&self, record: &StoredRecord) -> EngineResult<Vec<StoredRecord>> {
        let mut chain = Vec::new();
        let Some(base) = record.as_behavioral() else {
            return Ok(chain);
        };
        let Some(first_hop) = base.derived_id else {
            return Ok(chain);
        };
        let Some(first) = self.store.get(first_hop)? else {
            return Ok(chain);
        };
        match &first {
            StoredRecord::Demerit(_) => chain.push(first),
            StoredRecord::Behavioral(intermediate) => {
                let second_hop = intermediate.derived_id;
                chain.push(first);
                if let Some(second_hop) = second_hop {
                    if let Some(second) = self.store.get(second_hop)? {
                        if second.as_demerit().is_some() {
                            chain.push(second);
                        }
                    }
                }
            }
            // Exchange targets are not collected
            StoredRecord::Reward(_) => {}
        }
        Ok(chain)
    }

    /// Returns batch siblings of a deleted derivation to the pool.
    fn reset_siblings(
        &self,
        derived_id: RecordId,
        doomed: &HashSet<RecordId>,
    ) -> EngineResult<usize> {
        let siblings = self
            .store
            .find(&Query::behavioral().derived_id(derived_id))?;
        let mut reset = 0usize;
        for sibling in siblings {
            if doomed.contains(&sibling.id()) {
                continue;
            }
            let applied = self.store.update(sibling.id(), &mut |stored| match stored {
                StoredRecord::Behavioral(b) if b.derived_id == Some(derived_id) => {
                    b.consumed = false;
                    b.derived_id = None;
                    true
                }
                _ => false,
            })?;
            if applied {
                reset += 1;
            }
        }
        Ok(reset)
    }

    /// Frees reward credits attached to a deleted demerit. Delivery
    /// state on the credits is left untouched.
    fn free_rewards(
        &self,
        demerit_id: RecordId,
        reward_ids: &[RecordId],
    ) -> EngineResult<usize> {
        let mut freed = 0usize;
        for reward_id in reward_ids {
            let applied = self.store.update(*reward_id, &mut |stored| match stored {
                StoredRecord::Reward(r) if r.offset_demerit_id == Some(demerit_id) => {
                    r.consumed = false;
                    r.offset_demerit_id = None;
                    true
                }
                _ => false,
            })?;
            if applied {
                freed += 1;
            }
        }
        Ok(freed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::engine::IngestRequest;
    use crate::model::Semester;
    use crate::notify::NullNotifier;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn engine() -> RuleEngine<MemoryStore, FixedClock, NullNotifier> {
        let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2025, 9, 20).unwrap());
        RuleEngine::new(MemoryStore::new(), clock, NullNotifier)
    }

    fn request(record_type: &str, day: u32) -> IngestRequest {
        IngestRequest {
            record_type: record_type.into(),
            student: "Li".into(),
            class: "10A".into(),
            semester: Semester::new("2025 Fall"),
            recorded_by: "Ms Wong".into(),
            date: NaiveDate::from_ymd_opt(2025, 9, day).unwrap(),
            reason: None,
            source: None,
            prefer_execution: false,
        }
    }

    fn teacher() -> Requester {
        Requester {
            name: "Ms Wong".into(),
            is_admin: false,
        }
    }

    fn admin() -> Requester {
        Requester {
            name: "Registrar".into(),
            is_admin: true,
        }
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let engine = engine();
        let err = engine.withdraw(RecordId::new(), &admin()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_author_mismatch_is_forbidden() {
        let engine = engine();
        let id = engine.ingest(request("tardy", 1)).unwrap().record_id;
        let stranger = Requester {
            name: "Mr Park".into(),
            is_admin: false,
        };
        let err = engine.withdraw(id, &stranger).unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
        assert!(engine.store().get(id).unwrap().is_some());
    }

    #[test]
    fn test_blank_requester_name_is_forbidden() {
        let engine = engine();
        let id = engine.ingest(request("tardy", 1)).unwrap().record_id;
        // An empty name is a substring of every author string; it must
        // never pass the author check.
        let nameless = Requester {
            name: String::new(),
            is_admin: false,
        };
        let err = engine.withdraw(id, &nameless).unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
        assert!(engine.store().get(id).unwrap().is_some());
    }

    #[test]
    fn test_recording_teacher_may_withdraw() {
        let engine = engine();
        let id = engine.ingest(request("tardy", 1)).unwrap().record_id;
        let outcome = engine.withdraw(id, &teacher()).unwrap();
        assert_eq!(outcome.deleted, vec![id]);
        assert!(engine.store().get(id).unwrap().is_none());
    }

    #[test]
    fn test_cascade_deletes_derived_demerit_and_resets_sibling() {
        let engine = engine();
        let first = engine.ingest(request("tardy", 1)).unwrap().record_id;
        let second = engine.ingest(request("tardy", 2)).unwrap().record_id;
        assert_eq!(engine.store().count(&Query::demerits()).unwrap(), 1);

        let outcome = engine.withdraw(first, &teacher()).unwrap();
        assert_eq!(outcome.deleted.len(), 2);
        assert_eq!(outcome.siblings_reset, 1);

        assert_eq!(engine.store().count(&Query::demerits()).unwrap(), 0);
        let survivor = engine.store().get(second).unwrap().unwrap();
        let b = survivor.as_behavioral().unwrap();
        assert!(!b.consumed);
        assert_eq!(b.derived_id, None);
    }

    #[test]
    fn test_two_hop_cascade_through_intermediate() {
        let engine = engine();
        // Four warnings plus two trash records: the trash fold mints the
        // fifth warning, which tips the demerit.
        for day in 1..=4 {
            engine.ingest(request("dorm_warning", day)).unwrap();
        }
        let trash = engine.ingest(request("dorm_trash", 5)).unwrap().record_id;
        engine.ingest(request("dorm_trash", 6)).unwrap();
        assert_eq!(engine.store().count(&Query::demerits()).unwrap(), 1);

        let outcome = engine.withdraw(trash, &teacher()).unwrap();
        // Trash record, derived warning, derived demerit
        assert_eq!(outcome.deleted.len(), 3);
        // One trash sibling plus four warning siblings
        assert_eq!(outcome.siblings_reset, 5);
        assert_eq!(engine.store().count(&Query::demerits()).unwrap(), 0);
        assert_eq!(
            engine
                .store()
                .count(&Query::behavioral().consumed(true))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_withdrawal_frees_attached_rewards() {
        let engine = engine();
        let demerit = engine.ingest(request("demerit", 1)).unwrap().record_id;
        let credit = engine.ingest(request("reward", 2)).unwrap().record_id;

        let outcome = engine.withdraw(demerit, &teacher()).unwrap();
        assert_eq!(outcome.rewards_freed, 1);

        let freed = engine.store().get(credit).unwrap().unwrap();
        let r = freed.as_reward().unwrap();
        assert!(!r.consumed);
        assert_eq!(r.offset_demerit_id, None);
    }

    #[test]
    fn test_delivered_demerit_blocks_the_whole_cascade() {
        let engine = engine();
        let first = engine.ingest(request("tardy", 1)).unwrap().record_id;
        engine.ingest(request("tardy", 2)).unwrap();
        let demerit_id = engine
            .store()
            .find(&Query::demerits())
            .unwrap()
            .remove(0)
            .id();
        engine.deliver_demerit(demerit_id, "Homeroom").unwrap();

        let err = engine.withdraw(first, &admin()).unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
        // Nothing deleted, nothing reset
        assert!(engine.store().get(first).unwrap().is_some());
        assert_eq!(engine.store().count(&Query::demerits()).unwrap(), 1);
        assert_eq!(
            engine
                .store()
                .count(&Query::behavioral().consumed(true))
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_rewards_cannot_be_withdrawn() {
        let engine = engine();
        engine.ingest(request("demerit", 1)).unwrap();
        let credit = engine.ingest(request("reward", 2)).unwrap().record_id;
        let err = engine.withdraw(credit, &admin()).unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[test]
    fn test_system_author_matches_after_prefix_strip() {
        let engine = engine();
        engine.ingest(request("tardy", 1)).unwrap();
        engine.ingest(request("tardy", 2)).unwrap();
        let demerit_id = engine
            .store()
            .find(&Query::demerits())
            .unwrap()
            .remove(0)
            .id();

        // The minted demerit's author is "system: accumulated tardy";
        // a teacher named after the source type does not match, an
        // admin always does.
        let impostor = Requester {
            name: "nobody".into(),
            is_admin: false,
        };
        assert!(engine.withdraw(demerit_id, &impostor).is_err());
        assert!(engine.withdraw(demerit_id, &admin()).is_ok());
    }
}
