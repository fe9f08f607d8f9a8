//! Declarative accumulation rule table
//!
//! One generic recursive interpreter (the accumulation engine) walks this
//! table instead of hard-coding per-type branches, so chain depth stays
//! open-ended and each hop is testable in isolation.
//!
//! The standard table mirrors the school's production rules; deployments
//! may load a tuned table from a JSON file.

mod errors;

pub use errors::{RulesError, RulesResult};

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{RecordType, SourceCategory};

/// What a full batch of source records turns into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleOutcome {
    /// Mint one demerit tagged with this source category
    Demerit { source: SourceCategory },
    /// Mint one record of another accumulating type and re-run the table on it
    Intermediate { target: RecordType },
    /// Cross a redemption threshold; conversion needs an explicit exchange
    RewardHint,
}

/// Threshold and result for one accumulating type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRule {
    /// How many unconsumed records make one batch
    pub threshold: usize,
    pub outcome: RuleOutcome,
}

/// The complete rule configuration the engine runs against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleBook {
    /// Accumulation rules per source type
    pub rules: HashMap<RecordType, ChainRule>,
    /// Types that synthesize one demerit per record, bypassing accumulation
    pub direct_demerits: HashMap<RecordType, SourceCategory>,
    /// Types allowing at most one record per student per calendar day
    pub daily_unique: HashSet<RecordType>,
    /// Types that skip the homeroom notification
    pub no_notify: HashSet<RecordType>,
}

impl RuleBook {
    /// The production rule table.
    pub fn standard() -> Self {
        let mut rules = HashMap::new();
        rules.insert(
            RecordType::Tardy,
            ChainRule {
                threshold: 2,
                outcome: RuleOutcome::Demerit {
                    source: SourceCategory::Other,
                },
            },
        );
        rules.insert(
            RecordType::LeaveRoomLate,
            ChainRule {
                threshold: 2,
                outcome: RuleOutcome::Demerit {
                    source: SourceCategory::Dorm,
                },
            },
        );
        rules.insert(
            RecordType::LateSchoolReturn,
            ChainRule {
                threshold: 2,
                outcome: RuleOutcome::Demerit {
                    source: SourceCategory::Dorm,
                },
            },
        );
        rules.insert(
            RecordType::MeetingRoomIntrusion,
            ChainRule {
                threshold: 2,
                outcome: RuleOutcome::Demerit {
                    source: SourceCategory::Other,
                },
            },
        );
        rules.insert(
            RecordType::DormWarning,
            ChainRule {
                threshold: 5,
                outcome: RuleOutcome::Demerit {
                    source: SourceCategory::Dorm,
                },
            },
        );
        rules.insert(
            RecordType::DormTrash,
            ChainRule {
                threshold: 2,
                outcome: RuleOutcome::Intermediate {
                    target: RecordType::DormWarning,
                },
            },
        );
        rules.insert(
            RecordType::TeachingDemeritTicket,
            ChainRule {
                threshold: 3,
                outcome: RuleOutcome::Demerit {
                    source: SourceCategory::Teaching,
                },
            },
        );
        rules.insert(
            RecordType::DormPraise,
            ChainRule {
                threshold: 10,
                outcome: RuleOutcome::RewardHint,
            },
        );
        rules.insert(
            RecordType::TeachingRewardTicket,
            ChainRule {
                threshold: 6,
                outcome: RuleOutcome::RewardHint,
            },
        );

        let mut direct_demerits = HashMap::new();
        direct_demerits.insert(RecordType::ElectronicsViolation, SourceCategory::Electronics);
        direct_demerits.insert(RecordType::LatePhoneReturn, SourceCategory::Dorm);

        let daily_unique = [
            RecordType::Tardy,
            RecordType::DormTrash,
            RecordType::LatePhoneReturn,
        ]
        .into_iter()
        .collect();

        let no_notify = [
            RecordType::DormPraise,
            RecordType::TeachingRewardTicket,
            RecordType::Reward,
        ]
        .into_iter()
        .collect();

        let book = Self {
            rules,
            direct_demerits,
            daily_unique,
            no_notify,
        };
        debug_assert!(book.validate().is_ok());
        book
    }

    /// Loads a rule book from a JSON file and validates its structure.
    pub fn from_json_file(path: &Path) -> RulesResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| RulesError::io(path.display().to_string(), e))?;
        let book: Self = serde_json::from_str(&content)
            .map_err(|e| RulesError::malformed(path.display().to_string(), e.to_string()))?;
        book.validate()?;
        Ok(book)
    }

    /// Structural validation: sane thresholds, resolvable chain targets,
    /// no cycles, no type that is both direct and accumulating.
    pub fn validate(&self) -> RulesResult<()> {
        for (record_type, rule) in &self.rules {
            if rule.threshold < 2 {
                return Err(RulesError::invalid(format!(
                    "rule for {record_type} has threshold {}; accumulation needs at least 2",
                    rule.threshold
                )));
            }
            if self.direct_demerits.contains_key(record_type) {
                return Err(RulesError::invalid(format!(
                    "{record_type} is both a direct-demerit type and an accumulating type"
                )));
            }
            if let RuleOutcome::Intermediate { target } = rule.outcome {
                if !self.rules.contains_key(&target) {
                    return Err(RulesError::invalid(format!(
                        "chain target {target} of {record_type} has no rule of its own"
                    )));
                }
            }
        }

        // Cycle check: follow intermediate hops; depth can never exceed
        // the number of rules in an acyclic table.
        for start in self.rules.keys() {
            let mut current = *start;
            let mut hops = 0;
            while let Some(ChainRule {
                outcome: RuleOutcome::Intermediate { target },
                ..
            }) = self.rules.get(&current)
            {
                current = *target;
                hops += 1;
                if hops > self.rules.len() {
                    return Err(RulesError::invalid(format!(
                        "accumulation chain starting at {start} never terminates"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Rule for an accumulating type, if any
    pub fn rule_for(&self, record_type: RecordType) -> Option<&ChainRule> {
        self.rules.get(&record_type)
    }

    /// Source category for a direct-demerit type, if any
    pub fn direct_demerit(&self, record_type: RecordType) -> Option<SourceCategory> {
        self.direct_demerits.get(&record_type).copied()
    }

    pub fn is_daily_unique(&self, record_type: RecordType) -> bool {
        self.daily_unique.contains(&record_type)
    }

    pub fn notifies(&self, record_type: RecordType) -> bool {
        !self.no_notify.contains(&record_type)
    }
}

impl Default for RuleBook {
    fn default() -> Self {
        Self::standard()
    }
}
