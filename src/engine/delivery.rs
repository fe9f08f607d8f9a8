//! Execution and delivery workflow
//!
//! A demerit is executed once enforcement happened (or two credits
//! cleared it); delivering the paper notice is the terminal step for
//! demerits and reward credits alike. Delivered records never change
//! again and block withdrawal of their chain.

use crate::clock::Clock;
use crate::model::{RecordId, StoredRecord};
use crate::notify::NotificationSender;
use crate::observability::{log, Severity};
use crate::store::RecordStore;

use super::errors::{EngineError, EngineResult};
use super::RuleEngine;

impl<S, C, N> RuleEngine<S, C, N>
where
    S: RecordStore,
    C: Clock,
    N: NotificationSender,
{
    /// Marks a demerit executed, stamping the time. Idempotent for a
    /// demerit already executed; forbidden once delivered.
    pub fn execute_demerit(&self, record_id: RecordId) -> EngineResult<()> {
        let record = self
            .store
            .get(record_id)?
            .ok_or(EngineError::NotFound(record_id))?;
        let demerit = record
            .as_demerit()
            .ok_or(EngineError::NotFound(record_id))?;
        if demerit.delivered {
            return Err(EngineError::forbidden(
                "a delivered demerit cannot be modified",
            ));
        }

        let now = self.clock.now();
        self.store.update(record_id, &mut |stored| match stored {
            StoredRecord::Demerit(d) if !d.delivered => {
                if !d.executed {
                    d.executed = true;
                    d.executed_at = Some(now);
                }
                true
            }
            _ => false,
        })?;

        log(
            Severity::Info,
            "demerit_executed",
            &[("record_id", record_id.to_string())],
        );
        Ok(())
    }

    /// Marks a demerit's paper notice as handed out. Terminal:
    /// re-delivery is forbidden.
    pub fn deliver_demerit(
        &self,
        record_id: RecordId,
        delivered_by: &str,
    ) -> EngineResult<()> {
        let record = self
            .store
            .get(record_id)?
            .ok_or(EngineError::NotFound(record_id))?;
        let demerit = record
            .as_demerit()
            .ok_or(EngineError::NotFound(record_id))?;
        if demerit.delivered {
            return Err(EngineError::forbidden("demerit already delivered"));
        }

        let now = self.clock.now();
        let by = delivered_by.to_string();
        self.store.update(record_id, &mut |stored| match stored {
            StoredRecord::Demerit(d) if !d.delivered => {
                d.delivered = true;
                d.delivered_at = Some(now);
                d.delivered_by = Some(by.clone());
                true
            }
            _ => false,
        })?;

        log(
            Severity::Info,
            "demerit_delivered",
            &[
                ("record_id", record_id.to_string()),
                ("delivered_by", delivered_by.to_string()),
            ],
        );
        Ok(())
    }

    /// Marks a reward credit's certificate as handed out. Terminal:
    /// re-delivery is forbidden. Delivery does not consume the credit.
    pub fn deliver_reward(
        &self,
        record_id: RecordId,
        delivered_by: &str,
    ) -> EngineResult<()> {
        let record = self
            .store
            .get(record_id)?
            .ok_or(EngineError::NotFound(record_id))?;
        let credit = record
            .as_reward()
            .ok_or(EngineError::NotFound(record_id))?;
        if credit.delivered {
            return Err(EngineError::forbidden("reward credit already delivered"));
        }

        let now = self.clock.now();
        let by = delivered_by.to_string();
        self.store.update(record_id, &mut |stored| match stored {
            StoredRecord::Reward(r) if !r.delivered => {
                r.delivered = true;
                r.delivered_at = Some(now);
                r.delivered_by = Some(by.clone());
                true
            }
            _ => false,
        })?;

        log(
            Severity::Info,
            "reward_delivered",
            &[
                ("record_id", record_id.to_string()),
                ("delivered_by", delivered_by.to_string()),
            ],
        );
        Ok(())
    }
}
