use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
use crate::collaborators::{
    DocumentSource, IdentityResolver, InMemoryDocumentSource, InMemoryIdentityResolver,
    ReminderContext, ReminderSink, TracingReminderSink,
};
use crate::domain::chain::{ApprovalChain, ApproverId, ChainId, ConsensusType};
use crate::domain::document::{Document, DocumentId};
use crate::domain::escalation::EscalationEvent;
use crate::domain::request::{ApprovalRequest, Decision, DecisionOutcome, RequestId};
use crate::errors::EngineError;
use crate::escalation::{self, EscalationSettings, ReminderLedger, SweepAction};
use crate::metrics::RequestMetrics;
use crate::requests::machine::{self, SubmissionOutcome};
use crate::routing::{RoutingEngine, RoutingOutcome, RoutingRule};
use crate::store::RequestStore;

/// One entry of a request's ordered history: decisions and escalation
/// events merged by timestamp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    Decision { decision: Decision, approver_display: Option<String> },
    Escalation { event: EscalationEvent },
}

impl HistoryEntry {
    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::Decision { decision, .. } => decision.decided_at,
            Self::Escalation { event } => event.occurred_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestHistory {
    pub request_id: RequestId,
    pub entries: Vec<HistoryEntry>,
}

/// Outcome of one sweep pass over one request.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepReport {
    pub request_id: RequestId,
    pub action: SweepAction,
}

/// The approval engine's front door: owns the request store, the routing
/// inputs (chains and rules), and the collaborator seams. Every state
/// mutation funnels through here so the per-request serialization and the
/// audit trail cannot be bypassed.
pub struct ApprovalService<S> {
    store: S,
    routing: RoutingEngine,
    chains: Vec<ApprovalChain>,
    rules: Vec<RoutingRule>,
    documents: Arc<dyn DocumentSource>,
    identities: Arc<dyn IdentityResolver>,
    audit: Arc<dyn AuditSink>,
    reminders: Arc<dyn ReminderSink>,
    settings: EscalationSettings,
    reminder_ledger: Mutex<ReminderLedger>,
}

impl<S> ApprovalService<S>
where
    S: RequestStore,
{
    pub fn new(store: S, chains: Vec<ApprovalChain>, rules: Vec<RoutingRule>) -> Self {
        Self {
            store,
            routing: RoutingEngine::default(),
            chains,
            rules,
            documents: Arc::new(InMemoryDocumentSource::default()),
            identities: Arc::new(InMemoryIdentityResolver::default()),
            audit: Arc::new(InMemoryAuditSink::default()),
            reminders: Arc::new(TracingReminderSink),
            settings: EscalationSettings::default(),
            reminder_ledger: Mutex::new(ReminderLedger::default()),
        }
    }

    pub fn with_documents(mut self, documents: Arc<dyn DocumentSource>) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_identities(mut self, identities: Arc<dyn IdentityResolver>) -> Self {
        self.identities = identities;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_reminders(mut self, reminders: Arc<dyn ReminderSink>) -> Self {
        self.reminders = reminders;
        self
    }

    pub fn with_settings(mut self, settings: EscalationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &EscalationSettings {
        &self.settings
    }

    pub fn chains(&self) -> &[ApprovalChain] {
        &self.chains
    }

    /// Pure routing: same document, rules, and chains always give the
    /// same outcome.
    pub fn route_document(&self, document: &Document) -> Result<RoutingOutcome, EngineError> {
        let outcome = self.routing.route(document, &self.rules, &self.chains);
        match &outcome {
            Ok(resolved) => self.audit.emit(
                AuditEvent::new(
                    None,
                    Some(document.id.clone()),
                    document.id.0.clone(),
                    "routing.resolved",
                    AuditCategory::Routing,
                    "routing-engine",
                    AuditOutcome::Success,
                )
                .with_metadata("chain_id", resolved.chain_id.0.clone())
                .with_metadata("reason", resolved.reason.clone()),
            ),
            Err(error) => self.audit.emit(
                AuditEvent::new(
                    None,
                    Some(document.id.clone()),
                    document.id.0.clone(),
                    "routing.failed",
                    AuditCategory::Routing,
                    "routing-engine",
                    AuditOutcome::Rejected,
                )
                .with_metadata("error", error.to_string()),
            ),
        }
        outcome
    }

    /// Creates a request for a stored document, routing it when no
    /// explicit chain is named, and snapshots the selected chain.
    pub fn create_request(
        &self,
        document_id: &DocumentId,
        chain_id: Option<ChainId>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRequest, EngineError> {
        let document = self.documents.fields(document_id).ok_or_else(|| {
            EngineError::Validation(format!("document `{}` is not known", document_id.0))
        })?;

        let (chain_id, reason) = match chain_id {
            Some(explicit) => (explicit, "Explicit chain selection".to_string()),
            None => {
                let outcome = self.route_document(&document)?;
                (outcome.chain_id, outcome.reason)
            }
        };

        let chain = self
            .chains
            .iter()
            .find(|chain| chain.id == chain_id && chain.active)
            .cloned()
            .ok_or_else(|| EngineError::ChainNotFound(chain_id.0.clone()))?;
        let chain = self.enrich_weights(chain);

        let request = ApprovalRequest::open(
            RequestId(Uuid::new_v4().to_string()),
            document_id.clone(),
            chain,
            now,
        )?;
        self.store.insert(request.clone())?;

        self.audit.emit(
            AuditEvent::new(
                Some(request.id.clone()),
                Some(document_id.clone()),
                request.id.0.clone(),
                "request.created",
                AuditCategory::Transition,
                "approval-engine",
                AuditOutcome::Success,
            )
            .with_metadata("chain_id", chain_id.0)
            .with_metadata("routing_reason", reason),
        );
        Ok(request)
    }

    pub fn get(&self, request_id: &RequestId) -> Result<ApprovalRequest, EngineError> {
        self.store.get(request_id)
    }

    pub fn decide(
        &self,
        request_id: &RequestId,
        approver: &ApproverId,
        outcome: DecisionOutcome,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(ApprovalRequest, SubmissionOutcome), EngineError> {
        let result = self.store.with_request(request_id, |request| {
            let submission = machine::submit_decision(request, approver, outcome, comment, now)?;
            Ok((request.clone(), submission))
        });

        match &result {
            Ok((request, submission)) => {
                let audit_outcome = match submission {
                    SubmissionOutcome::LateRecorded => AuditOutcome::Warning,
                    _ => AuditOutcome::Success,
                };
                if matches!(submission, SubmissionOutcome::LateRecorded) {
                    tracing::warn!(
                        event_name = "request.late_decision_recorded",
                        request_id = %request_id.0,
                        approver_id = %approver.0,
                        "decision arrived for an already-resolved step; recorded for audit only"
                    );
                }
                self.audit.emit(
                    AuditEvent::new(
                        Some(request_id.clone()),
                        Some(request.document_id.clone()),
                        request_id.0.clone(),
                        "request.decision_submitted",
                        AuditCategory::Decision,
                        approver.0.clone(),
                        audit_outcome,
                    )
                    .with_metadata("outcome", format!("{outcome:?}"))
                    .with_metadata("submission", format!("{submission:?}"))
                    .with_metadata("status", format!("{:?}", request.status)),
                );
            }
            Err(error) => {
                self.audit.emit(
                    AuditEvent::new(
                        Some(request_id.clone()),
                        None,
                        request_id.0.clone(),
                        "request.decision_rejected",
                        AuditCategory::Decision,
                        approver.0.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }

        result
    }

    pub fn cancel(&self, request_id: &RequestId) -> Result<ApprovalRequest, EngineError> {
        let request = self.store.with_request(request_id, |request| {
            machine::cancel(request)?;
            Ok(request.clone())
        })?;

        self.forget_reminders(request_id);
        self.audit.emit(
            AuditEvent::new(
                Some(request_id.clone()),
                Some(request.document_id.clone()),
                request_id.0.clone(),
                "request.cancelled",
                AuditCategory::Transition,
                "approval-engine",
                AuditOutcome::Success,
            ),
        );
        Ok(request)
    }

    pub fn delegate(
        &self,
        request_id: &RequestId,
        from: &ApproverId,
        to: &ApproverId,
    ) -> Result<ApprovalRequest, EngineError> {
        let request = self.store.with_request(request_id, |request| {
            machine::delegate(request, from, to)?;
            Ok(request.clone())
        })?;

        self.audit.emit(
            AuditEvent::new(
                Some(request_id.clone()),
                Some(request.document_id.clone()),
                request_id.0.clone(),
                "request.delegated",
                AuditCategory::Transition,
                from.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("to", to.0.clone()),
        );
        Ok(request)
    }

    pub fn reopen(
        &self,
        request_id: &RequestId,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRequest, EngineError> {
        let request = self.store.with_request(request_id, |request| {
            machine::reopen(request, now)?;
            Ok(request.clone())
        })?;

        self.audit.emit(
            AuditEvent::new(
                Some(request_id.clone()),
                Some(request.document_id.clone()),
                request_id.0.clone(),
                "request.reopened",
                AuditCategory::Transition,
                "approval-engine",
                AuditOutcome::Success,
            ),
        );
        Ok(request)
    }

    /// Manual escalation: same state effect as a deadline breach, but
    /// stamped with the requesting user and their (mandatory) reason.
    pub fn manual_escalate(
        &self,
        request_id: &RequestId,
        by_user: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<EscalationEvent, EngineError> {
        if reason.trim().is_empty() {
            return Err(EngineError::Validation(
                "escalation reason must not be blank".to_string(),
            ));
        }

        let event = self
            .store
            .with_request(request_id, |request| machine::escalate_step(request, by_user, reason, now))?;

        self.notify_escalatee(&event, now);
        self.audit.emit(
            AuditEvent::new(
                Some(request_id.clone()),
                None,
                request_id.0.clone(),
                "request.escalated",
                AuditCategory::Escalation,
                by_user,
                AuditOutcome::Success,
            )
            .with_metadata("level", event.level.to_string())
            .with_metadata("escalated_to", event.escalated_to.0.clone())
            .with_metadata("reason", reason),
        );
        Ok(event)
    }

    /// One scheduler pass over every stored request. Each request is
    /// checked under its own write lock, so a decision racing the sweep
    /// either lands first (and the sweep sees the resolved step) or waits
    /// for the escalation to commit.
    pub fn run_escalation_sweep(&self, now: DateTime<Utc>) -> Vec<SweepReport> {
        let mut reports = Vec::new();

        for request_id in self.store.ids() {
            let action = self
                .store
                .with_request(&request_id, |request| escalation::sweep_request(request, now));

            match action {
                Ok(Some(action)) => {
                    self.report_sweep_action(&request_id, &action, now);
                    reports.push(SweepReport { request_id, action });
                }
                Ok(None) => {}
                Err(error) => {
                    // Failures here never block the rest of the sweep;
                    // the next cycle retries.
                    tracing::warn!(
                        event_name = "escalation.sweep_failed",
                        request_id = %request_id.0,
                        error = %error,
                        "escalation sweep skipped a request"
                    );
                }
            }
        }

        reports
    }

    /// Decision intake for offline replay: the decision was made against
    /// `expected_step`, so a request that advanced past it or went
    /// terminal in the meantime rejects the submission as stale instead
    /// of silently mis-applying it to the wrong step.
    pub fn replay_decision(
        &self,
        request_id: &RequestId,
        expected_step: u32,
        approver: &ApproverId,
        outcome: DecisionOutcome,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, EngineError> {
        let result = self.store.with_request(request_id, |request| {
            if request.is_terminal() {
                return Err(EngineError::StaleDecision {
                    request_id: request_id.0.clone(),
                    step_number: expected_step,
                    reason: format!("request reached terminal status {:?}", request.status),
                });
            }
            if request.current_step != expected_step {
                return Err(EngineError::StaleDecision {
                    request_id: request_id.0.clone(),
                    step_number: expected_step,
                    reason: format!("request advanced to step {}", request.current_step),
                });
            }
            machine::submit_decision(request, approver, outcome, comment, now)
        });

        let (event_type, audit_outcome) = match &result {
            Ok(_) => ("request.offline_decision_replayed", AuditOutcome::Success),
            Err(EngineError::StaleDecision { .. }) => {
                ("request.offline_decision_stale", AuditOutcome::Rejected)
            }
            Err(_) => ("request.offline_decision_failed", AuditOutcome::Failed),
        };
        self.audit.emit(
            AuditEvent::new(
                Some(request_id.clone()),
                None,
                request_id.0.clone(),
                event_type,
                AuditCategory::Replay,
                approver.0.clone(),
                audit_outcome,
            )
            .with_metadata("expected_step", expected_step.to_string()),
        );

        result
    }

    pub fn history(&self, request_id: &RequestId) -> Result<RequestHistory, EngineError> {
        let request = self.store.get(request_id)?;
        let mut entries: Vec<HistoryEntry> = request
            .decisions
            .iter()
            .map(|decision| HistoryEntry::Decision {
                decision: decision.clone(),
                approver_display: self
                    .identities
                    .resolve(&decision.approver_id)
                    .map(|profile| profile.display_name),
            })
            .chain(
                request
                    .escalations
                    .iter()
                    .map(|event| HistoryEntry::Escalation { event: event.clone() }),
            )
            .collect();
        entries.sort_by_key(HistoryEntry::occurred_at);

        Ok(RequestHistory { request_id: request_id.clone(), entries })
    }

    pub fn metrics(
        &self,
        request_id: &RequestId,
        now: DateTime<Utc>,
    ) -> Result<RequestMetrics, EngineError> {
        let request = self.store.get(request_id)?;
        Ok(RequestMetrics::compute(&request, now))
    }

    fn report_sweep_action(&self, request_id: &RequestId, action: &SweepAction, now: DateTime<Utc>) {
        match action {
            SweepAction::Escalated(event) => {
                self.notify_escalatee(event, now);
                self.audit.emit(
                    AuditEvent::new(
                        Some(request_id.clone()),
                        None,
                        request_id.0.clone(),
                        "request.escalated",
                        AuditCategory::Escalation,
                        event.escalated_by.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("level", event.level.to_string())
                    .with_metadata("escalated_to", event.escalated_to.0.clone()),
                );
            }
            SweepAction::AutoApproved { step_number, .. } => {
                self.forget_reminders(request_id);
                self.audit.emit(
                    AuditEvent::new(
                        Some(request_id.clone()),
                        None,
                        request_id.0.clone(),
                        "request.auto_approved_after_exhausted_escalation",
                        AuditCategory::Escalation,
                        "system",
                        AuditOutcome::Warning,
                    )
                    .with_metadata("step_number", step_number.to_string()),
                );
            }
            SweepAction::Overdue { step_number } => {
                tracing::warn!(
                    event_name = "escalation.step_overdue_without_fallback",
                    request_id = %request_id.0,
                    step_number = step_number,
                    "escalation chain exhausted; step remains overdue"
                );
            }
        }
    }

    /// Fire-and-forget, gated per (step, channel, level) by the ledger.
    /// A transport failure inside the sink never affects request state.
    fn notify_escalatee(&self, event: &EscalationEvent, now: DateTime<Utc>) {
        let cadence = Duration::hours(self.settings.reminder_cadence_hours);
        let context = ReminderContext {
            request_id: event.request_id.0.clone(),
            step_number: event.step_number,
            escalation_level: event.level,
            message: format!(
                "Approval step {} of request {} was escalated to you: {}",
                event.step_number, event.request_id.0, event.reason
            ),
        };

        let mut ledger = self.ledger();
        for channel in self.settings.reminder_channels.clone() {
            if ledger.should_send(
                &event.request_id,
                event.step_number,
                channel,
                event.level,
                now,
                cadence,
            ) {
                self.reminders.send(&event.escalated_to, channel, &context);
            }
        }
    }

    fn forget_reminders(&self, request_id: &RequestId) {
        self.ledger().forget(request_id);
    }

    fn ledger(&self) -> MutexGuard<'_, ReminderLedger> {
        match self.reminder_ledger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// A weighted step that carries no explicit weight for an approver
    /// inherits the identity profile's weight at snapshot time, so later
    /// profile changes do not reshuffle a running request.
    fn enrich_weights(&self, mut chain: ApprovalChain) -> ApprovalChain {
        for step in &mut chain.steps {
            if step.consensus != ConsensusType::Weighted {
                continue;
            }
            for approver in &step.approver_ids {
                if step.weights.contains_key(approver.0.as_str()) {
                    continue;
                }
                if let Some(weight) =
                    self.identities.resolve(approver).and_then(|profile| profile.weight)
                {
                    step.weights.insert(approver.0.clone(), weight);
                }
            }
        }
        chain
    }
}
