use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::chain::{ApprovalChain, ApproverId, ChainStep};
use crate::domain::document::DocumentId;
use crate::domain::escalation::EscalationEvent;
use crate::errors::EngineError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    InReview,
    Approved,
    Rejected,
    ChangesRequested,
    Cancelled,
}

impl RequestStatus {
    /// Terminal requests accept no further decisions; `changes_requested`
    /// can only leave this set through an explicit reopen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::ChangesRequested | Self::Cancelled
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Approve,
    Reject,
    RequestChanges,
}

/// One approver's recorded decision. Records are append-only: a later
/// decision from the same approver supersedes the earlier one for
/// consensus purposes, but every record stays in the history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub request_id: RequestId,
    pub step_number: u32,
    pub approver_id: ApproverId,
    pub outcome: DecisionOutcome,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepResolutionRecord {
    pub outcome: DecisionOutcome,
    pub resolved_at: DateTime<Utc>,
}

/// Mutable per-step state layered over the immutable chain snapshot:
/// deadline, escalation level, identity substitutions, and the resolution
/// record once the step closes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepProgress {
    pub step_number: u32,
    pub started_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub escalation_level: u32,
    pub added_approvers: Vec<ApproverId>,
    pub substitutions: BTreeMap<ApproverId, ApproverId>,
    pub resolution: Option<StepResolutionRecord>,
}

impl StepProgress {
    pub fn start(step: &ChainStep, now: DateTime<Utc>) -> Self {
        Self {
            step_number: step.number,
            started_at: now,
            deadline: step.deadline_from(now),
            escalation_level: 0,
            added_approvers: Vec::new(),
            substitutions: BTreeMap::new(),
            resolution: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// The approver identities currently allowed to decide this step: the
    /// step's base set after delegation substitutions, plus every identity
    /// appended by escalation. Escalatees add to the set, they never
    /// replace the original approver.
    pub fn effective_approvers(&self, step: &ChainStep) -> Vec<ApproverId> {
        let mut approvers: Vec<ApproverId> = step
            .approver_ids
            .iter()
            .map(|approver| {
                self.substitutions.get(approver).cloned().unwrap_or_else(|| approver.clone())
            })
            .collect();

        for added in &self.added_approvers {
            if !approvers.contains(added) {
                approvers.push(added.clone());
            }
        }

        approvers
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: RequestId,
    pub document_id: DocumentId,
    /// The chain definition this request executes against, snapshotted at
    /// creation. Later edits to the registered chain do not affect it.
    pub chain: ApprovalChain,
    pub current_step: u32,
    pub status: RequestStatus,
    pub decisions: Vec<Decision>,
    pub escalations: Vec<EscalationEvent>,
    pub progress: Vec<StepProgress>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn open(
        id: RequestId,
        document_id: DocumentId,
        chain: ApprovalChain,
        now: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        chain.validate()?;
        let first = chain
            .first_step_number()
            .ok_or_else(|| EngineError::Validation(format!("chain `{}` has no steps", chain.id.0)))?;
        let first_step = chain.step(first).cloned().ok_or_else(|| {
            EngineError::Validation(format!("chain `{}` is missing step {first}", chain.id.0))
        })?;

        Ok(Self {
            id,
            document_id,
            current_step: first,
            status: RequestStatus::Pending,
            decisions: Vec::new(),
            escalations: Vec::new(),
            progress: vec![StepProgress::start(&first_step, now)],
            created_at: now,
            chain,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn current_step_def(&self) -> Option<&ChainStep> {
        self.chain.step(self.current_step)
    }

    pub fn progress_for(&self, step_number: u32) -> Option<&StepProgress> {
        self.progress.iter().find(|progress| progress.step_number == step_number)
    }

    pub fn progress_for_mut(&mut self, step_number: u32) -> Option<&mut StepProgress> {
        self.progress.iter_mut().find(|progress| progress.step_number == step_number)
    }

    pub fn current_progress(&self) -> Option<&StepProgress> {
        self.progress_for(self.current_step)
    }

    pub fn current_progress_mut(&mut self) -> Option<&mut StepProgress> {
        let step_number = self.current_step;
        self.progress_for_mut(step_number)
    }

    /// The decision that counts per approver for one step: the latest
    /// record at or after `since`. A reopened step passes its new
    /// `started_at` so pre-reopen decisions stop counting.
    pub fn latest_step_decisions(
        &self,
        step_number: u32,
        since: DateTime<Utc>,
    ) -> BTreeMap<ApproverId, Decision> {
        let mut latest = BTreeMap::new();
        for decision in &self.decisions {
            if decision.step_number == step_number && decision.decided_at >= since {
                latest.insert(decision.approver_id.clone(), decision.clone());
            }
        }
        latest
    }
}
