use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consensus::ConsensusResolver;
use crate::domain::chain::ApproverId;
use crate::domain::escalation::EscalationEvent;
use crate::domain::request::{
    ApprovalRequest, Decision, DecisionOutcome, RequestStatus, StepProgress, StepResolutionRecord,
};
use crate::errors::EngineError;

/// What a decision submission did to the request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    /// Recorded; the step has not resolved yet.
    Pending,
    /// The step resolved `approve` and the request moved to the next step.
    Advanced { resolved: DecisionOutcome, next_step: u32 },
    /// The step resolved and the request reached a terminal status.
    Completed { resolved: DecisionOutcome, status: RequestStatus },
    /// Exact duplicate of a decision that already resolved a step;
    /// nothing changed.
    DuplicateIgnored,
    /// The step had already resolved; kept for the audit history only.
    LateRecorded,
}

/// Advances an `ApprovalRequest` through its chain snapshot. All
/// functions mutate the aggregate in place and either fully apply a
/// transition or leave the request untouched.
pub fn submit_decision(
    request: &mut ApprovalRequest,
    approver: &ApproverId,
    outcome: DecisionOutcome,
    comment: Option<String>,
    now: DateTime<Utc>,
) -> Result<SubmissionOutcome, EngineError> {
    if is_duplicate_of_resolved(request, approver, outcome) {
        return Ok(SubmissionOutcome::DuplicateIgnored);
    }

    if request.is_terminal() {
        return Err(terminal_error(request, "request is terminal"));
    }

    let step = current_step(request)?;
    let progress = current_progress(request)?.clone();

    if progress.is_resolved() {
        let late = record(request, step.number, approver, outcome, comment, now);
        request.decisions.push(late);
        return Ok(SubmissionOutcome::LateRecorded);
    }

    let effective = progress.effective_approvers(&step);
    if !effective.contains(approver) {
        return Err(EngineError::UnauthorizedApprover {
            request_id: request.id.0.clone(),
            step_number: step.number,
            approver_id: approver.0.clone(),
        });
    }

    let decision = record(request, step.number, approver, outcome, comment, now);
    request.decisions.push(decision);
    if request.status == RequestStatus::Pending {
        request.status = RequestStatus::InReview;
    }

    let latest = request.latest_step_decisions(step.number, progress.started_at);
    let resolution = ConsensusResolver.resolve(&latest, &step, &effective);
    match resolution.outcome {
        Some(resolved) if resolution.reached => Ok(apply_resolution(request, resolved, now)),
        _ => Ok(SubmissionOutcome::Pending),
    }
}

/// Force-resolves the current step without a decision record; used by the
/// escalation scheduler's auto-approve fallback.
pub fn resolve_current_step(
    request: &mut ApprovalRequest,
    outcome: DecisionOutcome,
    now: DateTime<Utc>,
) -> Result<SubmissionOutcome, EngineError> {
    if request.is_terminal() {
        return Err(terminal_error(request, "request is terminal"));
    }
    if current_progress(request)?.is_resolved() {
        return Err(terminal_error(request, "step has already resolved"));
    }
    Ok(apply_resolution(request, outcome, now))
}

pub fn cancel(request: &mut ApprovalRequest) -> Result<(), EngineError> {
    if request.is_terminal() {
        return Err(terminal_error(request, "terminal requests cannot be cancelled"));
    }
    request.status = RequestStatus::Cancelled;
    Ok(())
}

/// Substitutes an identity in the current step's required set. Decisions
/// the original approver already recorded are untouched.
pub fn delegate(
    request: &mut ApprovalRequest,
    from: &ApproverId,
    to: &ApproverId,
) -> Result<(), EngineError> {
    if request.is_terminal() {
        return Err(terminal_error(request, "terminal requests cannot delegate"));
    }

    let step = current_step(request)?;
    let request_id = request.id.0.clone();
    let progress = current_progress_mut(request)?;

    if let Some(position) = progress.added_approvers.iter().position(|added| added == from) {
        progress.added_approvers[position] = to.clone();
        return Ok(());
    }

    for base in &step.approver_ids {
        let current = progress.substitutions.get(base).unwrap_or(base);
        if current == from {
            progress.substitutions.insert(base.clone(), to.clone());
            return Ok(());
        }
    }

    Err(EngineError::Validation(format!(
        "`{}` is not an approver on step {} of request `{}`",
        from.0, step.number, request_id
    )))
}

/// Re-opens a `changes_requested` request on the same step. Decisions
/// recorded before the reopen stop counting toward consensus; the
/// deadline restarts from `now`.
pub fn reopen(request: &mut ApprovalRequest, now: DateTime<Utc>) -> Result<(), EngineError> {
    if request.status != RequestStatus::ChangesRequested {
        return Err(terminal_error(request, "only changes_requested requests can be reopened"));
    }

    let step = current_step(request)?;
    let progress = current_progress_mut(request)?;
    progress.resolution = None;
    progress.started_at = now;
    progress.deadline = step.deadline_from(now);
    progress.escalation_level = 0;
    request.status = RequestStatus::InReview;
    Ok(())
}

/// One escalation hop: append the next identity in the step's escalation
/// chain to the effective approver set and restart the deadline. The
/// prior approvers stay eligible, so their eventual decision still
/// counts.
pub fn escalate_step(
    request: &mut ApprovalRequest,
    escalated_by: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<EscalationEvent, EngineError> {
    if request.is_terminal() {
        return Err(terminal_error(request, "terminal requests cannot escalate"));
    }

    let step = current_step(request)?;
    let request_id = request.id.clone();
    let progress = current_progress_mut(request)?;

    if progress.is_resolved() {
        return Err(EngineError::InvalidStateTransition {
            request_id: request_id.0,
            status: RequestStatus::InReview,
            reason: "step has already resolved".to_string(),
        });
    }

    let level = progress.escalation_level as usize;
    if step.escalation_chain.is_empty() {
        return Err(EngineError::Validation(format!(
            "step {} of request `{}` has no escalation chain",
            step.number, request_id.0
        )));
    }
    if level >= step.escalation_chain.len() {
        return Err(EngineError::Validation(format!(
            "escalation chain exhausted for step {} of request `{}`",
            step.number, request_id.0
        )));
    }

    let target = step.escalation_chain[level].clone();
    progress.escalation_level += 1;
    if !progress.added_approvers.contains(&target) {
        progress.added_approvers.push(target.clone());
    }
    progress.deadline = step.deadline_from(now);

    let event = EscalationEvent {
        request_id,
        step_number: step.number,
        level: progress.escalation_level,
        escalated_by: escalated_by.to_string(),
        escalated_to: target,
        reason: reason.to_string(),
        occurred_at: now,
        resolved: false,
    };
    request.escalations.push(event.clone());
    Ok(event)
}

fn apply_resolution(
    request: &mut ApprovalRequest,
    resolved: DecisionOutcome,
    now: DateTime<Utc>,
) -> SubmissionOutcome {
    let step_number = request.current_step;
    if let Some(progress) = request.progress_for_mut(step_number) {
        progress.resolution = Some(StepResolutionRecord { outcome: resolved, resolved_at: now });
    }
    for escalation in &mut request.escalations {
        if escalation.step_number == step_number {
            escalation.resolved = true;
        }
    }

    match resolved {
        DecisionOutcome::Reject => {
            request.status = RequestStatus::Rejected;
            SubmissionOutcome::Completed { resolved, status: request.status }
        }
        DecisionOutcome::RequestChanges => {
            request.status = RequestStatus::ChangesRequested;
            SubmissionOutcome::Completed { resolved, status: request.status }
        }
        DecisionOutcome::Approve => advance(request, step_number, now),
    }
}

fn advance(
    request: &mut ApprovalRequest,
    from_step: u32,
    now: DateTime<Utc>,
) -> SubmissionOutcome {
    let resolved = DecisionOutcome::Approve;
    let step_optional =
        request.chain.step(from_step).map(|step| step.is_optional).unwrap_or(false);
    let remaining_all_optional =
        step_optional && request.chain.steps_after(from_step).all(|step| step.is_optional);

    match request.chain.step_after(from_step).cloned() {
        Some(next) if !remaining_all_optional => {
            request.current_step = next.number;
            request.progress.push(StepProgress::start(&next, now));
            request.status = RequestStatus::InReview;
            SubmissionOutcome::Advanced { resolved, next_step: next.number }
        }
        _ => {
            // Last step, or an optional step with only optional steps
            // left: the chain is complete. Current step parks one past
            // the end, the terminal marker.
            request.current_step =
                request.chain.last_step_number().unwrap_or(from_step) + 1;
            request.status = RequestStatus::Approved;
            SubmissionOutcome::Completed { resolved, status: request.status }
        }
    }
}

fn record(
    request: &ApprovalRequest,
    step_number: u32,
    approver: &ApproverId,
    outcome: DecisionOutcome,
    comment: Option<String>,
    now: DateTime<Utc>,
) -> Decision {
    Decision {
        request_id: request.id.clone(),
        step_number,
        approver_id: approver.clone(),
        outcome,
        comment,
        decided_at: now,
    }
}

fn is_duplicate_of_resolved(
    request: &ApprovalRequest,
    approver: &ApproverId,
    outcome: DecisionOutcome,
) -> bool {
    request.decisions.iter().any(|decision| {
        decision.approver_id == *approver
            && decision.outcome == outcome
            && request
                .progress_for(decision.step_number)
                .is_some_and(StepProgress::is_resolved)
    })
}

fn current_step(
    request: &ApprovalRequest,
) -> Result<crate::domain::chain::ChainStep, EngineError> {
    request.current_step_def().cloned().ok_or_else(|| {
        EngineError::Validation(format!(
            "request `{}` points at step {} which is not in its chain snapshot",
            request.id.0, request.current_step
        ))
    })
}

fn current_progress(request: &ApprovalRequest) -> Result<&StepProgress, EngineError> {
    let id = request.id.0.clone();
    let step = request.current_step;
    request.current_progress().ok_or_else(|| {
        EngineError::Validation(format!("request `{id}` has no progress record for step {step}"))
    })
}

fn current_progress_mut(
    request: &mut ApprovalRequest,
) -> Result<&mut StepProgress, EngineError> {
    let id = request.id.0.clone();
    let step = request.current_step;
    request.current_progress_mut().ok_or_else(|| {
        EngineError::Validation(format!("request `{id}` has no progress record for step {step}"))
    })
}

fn terminal_error(request: &ApprovalRequest, reason: &str) -> EngineError {
    EngineError::InvalidStateTransition {
        request_id: request.id.0.clone(),
        status: request.status,
        reason: reason.to_string(),
    }
}
