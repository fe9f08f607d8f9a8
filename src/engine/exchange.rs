//! Redeeming accumulated praise into reward credits
//!
//! Types whose rule outcome is a redemption hint never convert on their
//! own; a staff member triggers the conversion explicitly. Each minted
//! credit consumes one full batch of the oldest unconsumed source
//! records, linked through `derived_id` like any other fold. Exchange
//! never runs an offset pass; the credits stay banked until a demerit
//! exists to spend them on.

use crate::clock::Clock;
use crate::model::{RecordId, RecordType, RewardCredit, Semester, StoredRecord};
use crate::notify::NotificationSender;
use crate::observability::{log, Severity};
use crate::rules::RuleOutcome;
use crate::store::{Query, RecordStore, SortOrder};

use super::errors::{EngineError, EngineResult};
use super::keylock::lock_guard;
use super::{RuleEngine, SYSTEM_PREFIX};

/// A staff-triggered redemption.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    /// Source type tag; must carry a redemption rule
    pub record_type: String,
    pub student: String,
    pub class: String,
    pub semester: Semester,
    /// How many reward credits to mint
    pub count: usize,
    /// Spending preference stamped on the minted credits
    pub prefer_execution: bool,
}

/// What an exchange minted and consumed.
#[derive(Debug, Clone, Default)]
pub struct ExchangeOutcome {
    /// Ids of the minted reward credits, in mint order
    pub reward_ids: Vec<RecordId>,
    /// Source records consumed across all batches
    pub sources_consumed: usize,
}

impl<S, C, N> RuleEngine<S, C, N>
where
    S: RecordStore,
    C: Clock,
    N: NotificationSender,
{
    /// Converts `count` full batches of redeemable records into `count`
    /// reward credits. A zero count is a no-op.
    pub fn exchange(&self, request: ExchangeRequest) -> EngineResult<ExchangeOutcome> {
        let record_type = RecordType::parse(&request.record_type)
            .ok_or_else(|| EngineError::InvalidRecordType(request.record_type.clone()))?;
        let rule = self
            .rules()
            .rule_for(record_type)
            .filter(|r| r.outcome == RuleOutcome::RewardHint)
            .copied()
            .ok_or_else(|| {
                EngineError::InvalidRecordType(format!("{record_type} is not redeemable"))
            })?;
        if request.count == 0 {
            return Ok(ExchangeOutcome::default());
        }

        let handle = self
            .locks
            .handle(self.key(&request.student, &request.semester, record_type));
        let _guard = lock_guard(&handle);

        let pool = Query::behavioral()
            .record_type(record_type)
            .student(&request.student)
            .semester(&request.semester)
            .consumed(false);
        let needed = rule.threshold * request.count;
        let available = self.store.count(&pool)?;
        if available < needed {
            return Err(EngineError::InsufficientSources {
                record_type,
                needed,
                available,
            });
        }

        let sources = self
            .store
            .find(&pool.sort(SortOrder::DateAsc).limit(needed))?;

        let mut reward_ids = Vec::with_capacity(request.count);
        for batch in sources.chunks(rule.threshold) {
            let credit = RewardCredit::new(
                &request.student,
                &request.class,
                request.semester.clone(),
                format!("{SYSTEM_PREFIX} exchanged {record_type}"),
                self.clock.today(),
                Some(format!("exchanged {} x {record_type}", rule.threshold)),
                request.prefer_execution,
            );
            let credit_id = credit.id;
            self.store.insert(StoredRecord::Reward(credit))?;
            for source in batch {
                self.store.update(source.id(), &mut |stored| match stored {
                    StoredRecord::Behavioral(b) if !b.consumed => {
                        b.consumed = true;
                        b.derived_id = Some(credit_id);
                        true
                    }
                    _ => false,
                })?;
            }
            reward_ids.push(credit_id);
        }

        log(
            Severity::Info,
            "rewards_exchanged",
            &[
                ("student", request.student.clone()),
                ("semester", request.semester.to_string()),
                ("record_type", record_type.to_string()),
                ("minted", reward_ids.len().to_string()),
                ("sources_consumed", needed.to_string()),
            ],
        );
        Ok(ExchangeOutcome {
            reward_ids,
            sources_consumed: needed,
        })
    }
}
