use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};

use signoff_core::{
    ApprovalChain, ApprovalService, ApproverId, ApproverProfile, ChainId, ChainStep,
    ConsensusType, DecisionOutcome, Document, DocumentId, EngineError, EscalationPolicy,
    EscalationSettings, HistoryEntry, InMemoryAuditSink, InMemoryDocumentSource,
    InMemoryIdentityResolver, InMemoryReminderSink, InMemoryRequestStore, ReminderChannel,
    RequestStatus, RoutingCondition, RoutingRule, RuleEvaluator, SubmissionOutcome, SweepAction,
};

fn step(
    number: u32,
    consensus: ConsensusType,
    approvers: &[&str],
    timeout_days: Option<i64>,
    escalation: &[&str],
) -> ChainStep {
    ChainStep {
        number,
        name: format!("step-{number}"),
        approver_ids: approvers.iter().map(|id| ApproverId(id.to_string())).collect(),
        parallel: approvers.len() > 1,
        consensus,
        weights: BTreeMap::new(),
        timeout_days,
        escalation_chain: escalation.iter().map(|id| ApproverId(id.to_string())).collect(),
        is_optional: false,
    }
}

fn chain(id: &str, name: &str, steps: Vec<ChainStep>) -> ApprovalChain {
    ApprovalChain {
        id: ChainId(id.to_string()),
        name: name.to_string(),
        steps,
        active: true,
        escalation_policy: EscalationPolicy::default(),
    }
}

fn document(id: &str, doc_type: &str, value: f64) -> Document {
    Document {
        id: DocumentId(id.to_string()),
        doc_type: doc_type.to_string(),
        title: format!("{doc_type} {id}"),
        value,
        department: "finance".to_string(),
        confidentiality: "internal".to_string(),
        metadata: BTreeMap::new(),
    }
}

fn rule(id: &str, priority: i32, target: &str, conditions: Vec<RoutingCondition>) -> RoutingRule {
    RoutingRule {
        id: id.to_string(),
        name: format!("rule {id}"),
        conditions,
        target_chain_id: ChainId(target.to_string()),
        priority,
        is_active: true,
    }
}

fn service_with(
    chains: Vec<ApprovalChain>,
    rules: Vec<RoutingRule>,
    documents: Vec<Document>,
) -> (
    ApprovalService<InMemoryRequestStore>,
    InMemoryAuditSink,
    InMemoryReminderSink,
) {
    let audit = InMemoryAuditSink::default();
    let reminders = InMemoryReminderSink::default();
    let service = ApprovalService::new(InMemoryRequestStore::default(), chains, rules)
        .with_documents(Arc::new(InMemoryDocumentSource::with_documents(documents)))
        .with_audit(Arc::new(audit.clone()))
        .with_reminders(Arc::new(reminders.clone()))
        .with_settings(EscalationSettings {
            sweep_interval_secs: 60,
            reminder_cadence_hours: 24,
            reminder_channels: vec![ReminderChannel::Email],
        });
    (service, audit, reminders)
}

#[test]
fn two_step_chain_walks_from_routing_to_approved() {
    let chains = vec![chain(
        "contract-review",
        "Contract review",
        vec![
            step(1, ConsensusType::Unanimous, &["legal-1", "legal-2"], Some(2), &[]),
            step(2, ConsensusType::Any, &["vp-1", "vp-2", "vp-3"], None, &[]),
        ],
    )];
    let rules = vec![rule(
        "contracts",
        10,
        "contract-review",
        vec![RoutingCondition {
            field: "type".to_string(),
            operator: signoff_core::ConditionOperator::Equals,
            value: signoff_core::FieldValue::Text("contract".to_string()),
            logical: None,
        }],
    )];
    let (service, _, _) =
        service_with(chains, rules, vec![document("doc-1", "contract", 90_000.0)]);
    let now = Utc::now();

    let request = service
        .create_request(&DocumentId("doc-1".to_string()), None, now)
        .expect("routing should assign the contract chain");
    assert_eq!(request.chain.id.0, "contract-review");
    assert_eq!(request.status, RequestStatus::Pending);

    let (_, first) = service
        .decide(
            &request.id,
            &ApproverId("legal-1".to_string()),
            DecisionOutcome::Approve,
            None,
            now + Duration::minutes(5),
        )
        .expect("first unanimous vote");
    assert_eq!(first, SubmissionOutcome::Pending);

    let (_, second) = service
        .decide(
            &request.id,
            &ApproverId("legal-2".to_string()),
            DecisionOutcome::Approve,
            None,
            now + Duration::minutes(6),
        )
        .expect("second unanimous vote advances");
    assert_eq!(
        second,
        SubmissionOutcome::Advanced { resolved: DecisionOutcome::Approve, next_step: 2 }
    );

    let (updated, last) = service
        .decide(
            &request.id,
            &ApproverId("vp-3".to_string()),
            DecisionOutcome::Approve,
            None,
            now + Duration::minutes(10),
        )
        .expect("any single step-2 approval completes");
    assert_eq!(
        last,
        SubmissionOutcome::Completed {
            resolved: DecisionOutcome::Approve,
            status: RequestStatus::Approved,
        }
    );
    assert!(updated.is_terminal());

    let metrics = service
        .metrics(&request.id, now + Duration::minutes(11))
        .expect("metrics");
    assert_eq!(metrics.completion_pct, 100);
}

#[test]
fn majority_split_resolves_rejected_on_the_second_reject() {
    let chains = vec![chain(
        "spend",
        "Spend review",
        vec![step(1, ConsensusType::Majority, &["a", "b", "c"], None, &[])],
    )];
    let (service, _, _) = service_with(chains, Vec::new(), vec![document("doc-2", "invoice", 10.0)]);
    let now = Utc::now();
    let request = service
        .create_request(&DocumentId("doc-2".to_string()), Some(ChainId("spend".to_string())), now)
        .expect("explicit chain");

    let (_, after_reject) = service
        .decide(&request.id, &ApproverId("a".to_string()), DecisionOutcome::Reject, None, now)
        .expect("a rejects");
    assert_eq!(after_reject, SubmissionOutcome::Pending);

    let (_, after_approve) = service
        .decide(
            &request.id,
            &ApproverId("b".to_string()),
            DecisionOutcome::Approve,
            None,
            now + Duration::minutes(1),
        )
        .expect("b approves; still one vote each");
    assert_eq!(after_approve, SubmissionOutcome::Pending);

    let (updated, resolved) = service
        .decide(
            &request.id,
            &ApproverId("c".to_string()),
            DecisionOutcome::Reject,
            None,
            now + Duration::minutes(2),
        )
        .expect("c rejects; majority of 3 is 2");
    assert_eq!(
        resolved,
        SubmissionOutcome::Completed {
            resolved: DecisionOutcome::Reject,
            status: RequestStatus::Rejected,
        }
    );
    assert_eq!(updated.status, RequestStatus::Rejected);
}

#[test]
fn weighted_steps_inherit_profile_weights_at_snapshot_time() {
    let chains = vec![chain(
        "weighted",
        "Weighted review",
        vec![step(1, ConsensusType::Weighted, &["lead", "dev-1", "dev-2"], None, &[])],
    )];
    let (service, _, _) = service_with(
        chains,
        Vec::new(),
        vec![document("doc-3", "design", 0.0)],
    );
    let service = service.with_identities(Arc::new(InMemoryIdentityResolver::with_profiles(vec![
        ApproverProfile {
            id: ApproverId("lead".to_string()),
            display_name: "Lead".to_string(),
            email: "lead@example.com".to_string(),
            weight: Some(2),
        },
    ])));
    let now = Utc::now();

    let request = service
        .create_request(
            &DocumentId("doc-3".to_string()),
            Some(ChainId("weighted".to_string())),
            now,
        )
        .expect("request");
    // Snapshot carries lead=2, dev-1=dev-2=1: total 4, threshold 2.
    assert_eq!(request.chain.steps[0].weights.get("lead"), Some(&2));

    let (_, alone) = service
        .decide(&request.id, &ApproverId("lead".to_string()), DecisionOutcome::Approve, None, now)
        .expect("lead approves");
    assert_eq!(alone, SubmissionOutcome::Pending, "weight 2 does not strictly exceed 2");

    let (_, resolved) = service
        .decide(
            &request.id,
            &ApproverId("dev-1".to_string()),
            DecisionOutcome::Approve,
            None,
            now + Duration::minutes(1),
        )
        .expect("combined weight 3 crosses the threshold");
    assert_eq!(
        resolved,
        SubmissionOutcome::Completed {
            resolved: DecisionOutcome::Approve,
            status: RequestStatus::Approved,
        }
    );
}

#[test]
fn sweep_escalates_overdue_steps_and_reminds_idempotently() {
    let chains = vec![chain(
        "escalating",
        "Escalating review",
        vec![step(1, ConsensusType::Unanimous, &["slow-approver"], Some(2), &["lead", "vp"])],
    )];
    let (service, audit, reminders) =
        service_with(chains, Vec::new(), vec![document("doc-4", "invoice", 100.0)]);
    let now = Utc::now();
    let request = service
        .create_request(
            &DocumentId("doc-4".to_string()),
            Some(ChainId("escalating".to_string())),
            now,
        )
        .expect("request");

    // Two days pass without a decision: level 1 fires exactly once.
    let breach = now + Duration::days(2) + Duration::hours(1);
    let reports = service.run_escalation_sweep(breach);
    assert_eq!(reports.len(), 1);
    assert!(matches!(
        reports[0].action,
        SweepAction::Escalated(ref event) if event.level == 1 && event.escalated_by == "system"
    ));

    // Re-running in the same cycle does nothing: the deadline was reset.
    assert!(service.run_escalation_sweep(breach + Duration::minutes(5)).is_empty());

    let sends = reminders.sent();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, ApproverId("lead".to_string()));

    // Next breach escalates to level 2 and exhausts the chain.
    let second_breach = breach + Duration::days(2) + Duration::hours(1);
    let reports = service.run_escalation_sweep(second_breach);
    assert!(matches!(
        reports[0].action,
        SweepAction::Escalated(ref event) if event.level == 2
    ));

    // Exhausted with no fallback: surfaced as overdue, never approved.
    let third_breach = second_breach + Duration::days(2) + Duration::hours(1);
    let reports = service.run_escalation_sweep(third_breach);
    assert!(matches!(reports[0].action, SweepAction::Overdue { step_number: 1 }));
    let snapshot = service.get(&request.id).expect("request");
    assert_eq!(snapshot.status, RequestStatus::Pending);
    assert_eq!(snapshot.escalations.len(), 2);

    let escalation_events = audit
        .events()
        .into_iter()
        .filter(|event| event.event_type == "request.escalated")
        .count();
    assert_eq!(escalation_events, 2);
}

#[test]
fn manual_escalation_requires_a_reason_and_history_interleaves_events() {
    let chains = vec![chain(
        "mixed",
        "Mixed review",
        vec![step(1, ConsensusType::Majority, &["a", "b", "c"], Some(5), &["boss"])],
    )];
    let (service, _, _) = service_with(chains, Vec::new(), vec![document("doc-5", "memo", 1.0)]);
    let service = service.with_identities(Arc::new(InMemoryIdentityResolver::with_profiles(vec![
        ApproverProfile {
            id: ApproverId("a".to_string()),
            display_name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            weight: None,
        },
    ])));
    let now = Utc::now();
    let request = service
        .create_request(&DocumentId("doc-5".to_string()), Some(ChainId("mixed".to_string())), now)
        .expect("request");

    let blank = service.manual_escalate(&request.id, "ops-user", "   ", now);
    assert!(matches!(blank, Err(EngineError::Validation(_))));

    service
        .decide(&request.id, &ApproverId("a".to_string()), DecisionOutcome::Approve, None, now)
        .expect("a decides");
    let event = service
        .manual_escalate(
            &request.id,
            "ops-user",
            "customer waiting on signature",
            now + Duration::hours(1),
        )
        .expect("manual escalation");
    assert_eq!(event.escalated_by, "ops-user");
    assert_eq!(event.level, 1);

    let history = service.history(&request.id).expect("history");
    assert_eq!(history.entries.len(), 2);
    assert!(matches!(
        history.entries[0],
        HistoryEntry::Decision { ref approver_display, .. }
            if approver_display.as_deref() == Some("Ada")
    ));
    assert!(matches!(history.entries[1], HistoryEntry::Escalation { .. }));
}

#[test]
fn resubmitting_the_resolving_decision_leaves_no_trace() {
    let chains = vec![chain(
        "single",
        "Single step",
        vec![step(1, ConsensusType::Any, &["solo"], None, &[])],
    )];
    let (service, audit, _) =
        service_with(chains, Vec::new(), vec![document("doc-6", "memo", 1.0)]);
    let now = Utc::now();
    let request = service
        .create_request(&DocumentId("doc-6".to_string()), Some(ChainId("single".to_string())), now)
        .expect("request");

    service
        .decide(&request.id, &ApproverId("solo".to_string()), DecisionOutcome::Approve, None, now)
        .expect("resolves");
    let resolved_snapshot = service.get(&request.id).expect("snapshot");
    let audit_count = audit.events().len();

    let (after, outcome) = service
        .decide(
            &request.id,
            &ApproverId("solo".to_string()),
            DecisionOutcome::Approve,
            None,
            now + Duration::minutes(1),
        )
        .expect("duplicate accepted as no-op");
    assert_eq!(outcome, SubmissionOutcome::DuplicateIgnored);
    assert_eq!(after, resolved_snapshot);
    // One extra audit record for the submission itself, no transition or
    // escalation records.
    assert_eq!(audit.events().len(), audit_count + 1);
}

#[test]
fn routing_respects_priority_order_through_the_service() {
    let chains = vec![
        chain("fast", "Fast track", vec![step(1, ConsensusType::Any, &["a"], None, &[])]),
        chain("slow", "Slow track", vec![step(1, ConsensusType::Any, &["b"], None, &[])]),
    ];
    let high_value = RoutingCondition {
        field: "value".to_string(),
        operator: signoff_core::ConditionOperator::GreaterThan,
        value: signoff_core::FieldValue::Number(1_000.0),
        logical: None,
    };
    let rules = vec![
        rule("everything", 1, "fast", Vec::new()),
        rule("big-spend", 50, "slow", vec![high_value]),
    ];
    let (service, _, _) =
        service_with(chains, rules, vec![document("doc-7", "invoice", 5_000.0)]);

    let outcome = service
        .route_document(&document("doc-7", "invoice", 5_000.0))
        .expect("routing");
    assert_eq!(outcome.chain_id.0, "slow");
    assert_eq!(outcome.reason, "Matched rule: rule big-spend");

    // The evaluator itself is reusable standalone for rule previews.
    assert!(RuleEvaluator.evaluate(&[], &document("doc-8", "memo", 1.0)));
}
