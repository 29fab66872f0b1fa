use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::chain::ApproverId;
use crate::domain::request::RequestId;

/// Audit record of one escalation hop, automatic or manual.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub request_id: RequestId,
    pub step_number: u32,
    pub level: u32,
    pub escalated_by: String,
    pub escalated_to: ApproverId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
    pub resolved: bool,
}

/// Actor name stamped on deadline-driven escalations.
pub const SYSTEM_ACTOR: &str = "system";
