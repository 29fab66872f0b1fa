use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborators::ReminderChannel;
use crate::domain::escalation::{EscalationEvent, SYSTEM_ACTOR};
use crate::domain::request::{ApprovalRequest, DecisionOutcome, RequestId};
use crate::errors::EngineError;
use crate::requests::machine::{self, SubmissionOutcome};

/// Scheduler knobs, independent of any request-specific deadline. The
/// sweep interval drives the server's ticker; the reminder cadence bounds
/// how often an unacknowledged reminder re-fires for the same level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscalationSettings {
    pub sweep_interval_secs: u64,
    pub reminder_cadence_hours: i64,
    pub reminder_channels: Vec<ReminderChannel>,
}

impl Default for EscalationSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            reminder_cadence_hours: 24,
            reminder_channels: vec![ReminderChannel::Email],
        }
    }
}

/// What one sweep pass did to one request.
#[derive(Clone, Debug, PartialEq)]
pub enum SweepAction {
    /// Deadline breached, a level was available: escalated one hop.
    Escalated(EscalationEvent),
    /// Escalation chain exhausted and the chain's fallback policy allowed
    /// resolving the step as approved after the grace period.
    AutoApproved { step_number: u32, outcome: SubmissionOutcome },
    /// Escalation chain exhausted with no fallback: surfaced, never
    /// auto-resolved.
    Overdue { step_number: u32 },
}

/// Deadline check for a single request, run under the request's write
/// lock. At most one escalation level fires per sweep per step.
pub fn sweep_request(
    request: &mut ApprovalRequest,
    now: DateTime<Utc>,
) -> Result<Option<SweepAction>, EngineError> {
    if request.is_terminal() {
        return Ok(None);
    }
    let Some(step) = request.current_step_def().cloned() else {
        return Ok(None);
    };
    let Some(progress) = request.current_progress() else {
        return Ok(None);
    };
    if progress.is_resolved() {
        return Ok(None);
    }
    // No timeout, no deadline: the step never auto-escalates.
    let Some(deadline) = progress.deadline else {
        return Ok(None);
    };
    if now <= deadline {
        return Ok(None);
    }

    let level = progress.escalation_level as usize;
    if level < step.escalation_chain.len() {
        let event = machine::escalate_step(request, SYSTEM_ACTOR, "step deadline passed", now)?;
        return Ok(Some(SweepAction::Escalated(event)));
    }

    match request.chain.escalation_policy.auto_approve_after_days {
        Some(grace_days) if now > deadline + Duration::days(grace_days) => {
            let outcome =
                machine::resolve_current_step(request, DecisionOutcome::Approve, now)?;
            Ok(Some(SweepAction::AutoApproved { step_number: step.number, outcome }))
        }
        _ => Ok(Some(SweepAction::Overdue { step_number: step.number })),
    }
}

/// Idempotence ledger for reminder sends, keyed by request, step,
/// channel, and escalation level. A key fires at most once per cadence.
#[derive(Clone, Debug, Default)]
pub struct ReminderLedger {
    sent: BTreeMap<(RequestId, u32, ReminderChannel, u32), DateTime<Utc>>,
}

impl ReminderLedger {
    pub fn should_send(
        &mut self,
        request_id: &RequestId,
        step_number: u32,
        channel: ReminderChannel,
        level: u32,
        now: DateTime<Utc>,
        cadence: Duration,
    ) -> bool {
        let key = (request_id.clone(), step_number, channel, level);
        if let Some(last) = self.sent.get(&key) {
            if now - *last < cadence {
                return false;
            }
        }
        self.sent.insert(key, now);
        true
    }

    /// Drops ledger entries for a request that no longer needs reminders.
    pub fn forget(&mut self, request_id: &RequestId) {
        self.sent.retain(|(id, _, _, _), _| id != request_id);
    }
}
