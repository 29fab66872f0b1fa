use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::{ApprovalRequest, RequestStatus};

/// Progress snapshot for one request, served by the metrics endpoint and
/// used by operators to spot overdue steps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestMetrics {
    pub request_id: String,
    pub status: RequestStatus,
    pub current_step: u32,
    pub total_steps: usize,
    pub resolved_steps: usize,
    pub completion_pct: u8,
    pub elapsed_secs: i64,
    /// Seconds until the current step's deadline; negative once breached,
    /// absent when the step has no timeout or the request is terminal.
    pub remaining_secs: Option<i64>,
    pub overdue: bool,
    pub escalation_level: u32,
}

impl RequestMetrics {
    pub fn compute(request: &ApprovalRequest, now: DateTime<Utc>) -> Self {
        let total_steps = request.chain.steps.len();
        let resolved_steps =
            request.progress.iter().filter(|progress| progress.is_resolved()).count();

        let completion_pct = if request.status == RequestStatus::Approved {
            100
        } else if total_steps == 0 {
            0
        } else {
            ((resolved_steps * 100) / total_steps).min(100) as u8
        };

        let active = !request.is_terminal();
        let deadline = request
            .current_progress()
            .filter(|_| active)
            .and_then(|progress| progress.deadline);
        let remaining_secs = deadline.map(|deadline| (deadline - now).num_seconds());
        let overdue = remaining_secs.is_some_and(|remaining| remaining < 0);

        Self {
            request_id: request.id.0.clone(),
            status: request.status,
            current_step: request.current_step,
            total_steps,
            resolved_steps,
            completion_pct,
            elapsed_secs: (now - request.created_at).num_seconds(),
            remaining_secs,
            overdue,
            escalation_level: request
                .current_progress()
                .map(|progress| progress.escalation_level)
                .unwrap_or(0),
        }
    }
}
