use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApproverId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusType {
    Unanimous,
    Majority,
    Weighted,
    Any,
}

/// One stage of an approval chain, with its own approver set and
/// consensus rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainStep {
    pub number: u32,
    pub name: String,
    pub approver_ids: Vec<ApproverId>,
    #[serde(default)]
    pub parallel: bool,
    pub consensus: ConsensusType,
    /// Keyed by approver id; kept as plain strings so definitions files
    /// can write `weights.alice = 2` directly.
    #[serde(default)]
    pub weights: BTreeMap<String, u32>,
    #[serde(default)]
    pub timeout_days: Option<i64>,
    #[serde(default)]
    pub escalation_chain: Vec<ApproverId>,
    #[serde(default)]
    pub is_optional: bool,
}

impl ChainStep {
    /// Per-approver weight for weighted consensus; absent entries count 1.
    pub fn weight_of(&self, approver: &ApproverId) -> u32 {
        self.weights.get(approver.0.as_str()).copied().unwrap_or(1)
    }

    /// Steps without a timeout never get a deadline and never auto-escalate.
    pub fn deadline_from(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.timeout_days.map(|days| start + Duration::days(days))
    }
}

/// Fallback policy consulted once a step's escalation chain is exhausted.
/// Without `auto_approve_after_days` the step stays overdue and is only
/// surfaced through metrics, never silently approved.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    #[serde(default)]
    pub auto_approve_after_days: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalChain {
    pub id: ChainId,
    pub name: String,
    pub steps: Vec<ChainStep>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub escalation_policy: EscalationPolicy,
}

fn default_active() -> bool {
    true
}

impl ApprovalChain {
    pub fn step(&self, number: u32) -> Option<&ChainStep> {
        self.steps.iter().find(|step| step.number == number)
    }

    pub fn first_step_number(&self) -> Option<u32> {
        self.steps.iter().map(|step| step.number).min()
    }

    pub fn last_step_number(&self) -> Option<u32> {
        self.steps.iter().map(|step| step.number).max()
    }

    /// The next step strictly after `number`, in step-number order.
    pub fn step_after(&self, number: u32) -> Option<&ChainStep> {
        self.steps
            .iter()
            .filter(|step| step.number > number)
            .min_by_key(|step| step.number)
    }

    pub fn steps_after(&self, number: u32) -> impl Iterator<Item = &ChainStep> {
        self.steps.iter().filter(move |step| step.number > number)
    }

    /// Structural validation applied when definitions are loaded and when a
    /// request snapshots the chain.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.steps.is_empty() {
            return Err(EngineError::Validation(format!(
                "chain `{}` has no steps",
                self.id.0
            )));
        }

        let mut seen = BTreeSet::new();
        for step in &self.steps {
            if step.number == 0 {
                return Err(EngineError::Validation(format!(
                    "chain `{}` step `{}` uses step number 0; steps are 1-based",
                    self.id.0, step.name
                )));
            }
            if !seen.insert(step.number) {
                return Err(EngineError::Validation(format!(
                    "chain `{}` repeats step number {}",
                    self.id.0, step.number
                )));
            }
            if step.approver_ids.is_empty() {
                return Err(EngineError::Validation(format!(
                    "chain `{}` step {} has an empty approver set",
                    self.id.0, step.number
                )));
            }
            if step.weights.values().any(|weight| *weight == 0) {
                return Err(EngineError::Validation(format!(
                    "chain `{}` step {} assigns a zero weight",
                    self.id.0, step.number
                )));
            }
            if let Some(days) = step.timeout_days {
                if days <= 0 {
                    return Err(EngineError::Validation(format!(
                        "chain `{}` step {} has a non-positive timeout",
                        self.id.0, step.number
                    )));
                }
            }
        }

        Ok(())
    }
}
