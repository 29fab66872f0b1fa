use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::chain::ApproverId;
use crate::domain::request::{DecisionOutcome, RequestId};
use crate::errors::EngineError;
use crate::requests::machine::SubmissionOutcome;
use crate::requests::service::ApprovalService;
use crate::store::RequestStore;

/// A decision captured while the client was disconnected, pinned to the
/// step it was made against so replay can detect staleness.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueuedDecision {
    pub request_id: RequestId,
    pub step_number: u32,
    pub approver_id: ApproverId,
    pub outcome: DecisionOutcome,
    pub comment: Option<String>,
    pub queued_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReplayReport {
    pub decision: QueuedDecision,
    pub result: Result<SubmissionOutcome, EngineError>,
}

impl ReplayReport {
    pub fn is_stale(&self) -> bool {
        matches!(self.result, Err(EngineError::StaleDecision { .. }))
    }
}

/// FIFO buffer for decisions made offline. Lives for the client session
/// only; durability beyond that is an external concern. Replay reports
/// every rejected decision back instead of dropping it.
#[derive(Clone, Debug, Default)]
pub struct OfflineDecisionQueue {
    pending: VecDeque<QueuedDecision>,
}

impl OfflineDecisionQueue {
    pub fn enqueue(&mut self, decision: QueuedDecision) {
        self.pending.push_back(decision);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Replays every queued decision in original order once connectivity
    /// is back. The queue is emptied regardless of individual outcomes;
    /// callers inspect the reports for stale or failed entries.
    pub fn drain<S>(
        &mut self,
        service: &ApprovalService<S>,
        now: DateTime<Utc>,
    ) -> Vec<ReplayReport>
    where
        S: RequestStore,
    {
        let mut reports = Vec::with_capacity(self.pending.len());
        while let Some(decision) = self.pending.pop_front() {
            let result = service.replay_decision(
                &decision.request_id,
                decision.step_number,
                &decision.approver_id,
                decision.outcome,
                decision.comment.clone(),
                now,
            );
            reports.push(ReplayReport { decision, result });
        }
        reports
    }
}
