pub mod audit;
pub mod collaborators;
pub mod config;
pub mod consensus;
pub mod definitions;
pub mod domain;
pub mod errors;
pub mod escalation;
pub mod metrics;
pub mod offline;
pub mod requests;
pub mod routing;
pub mod rules;
pub mod store;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use collaborators::{
    ApproverProfile, DocumentSource, IdentityResolver, InMemoryDocumentSource,
    InMemoryIdentityResolver, InMemoryReminderSink, ReminderChannel, ReminderContext,
    ReminderSink, TracingReminderSink,
};
pub use config::{AppConfig, ConfigError, LoadOptions, LogFormat};
pub use consensus::{ConsensusResolver, StepResolution};
pub use definitions::Definitions;
pub use domain::chain::{
    ApprovalChain, ApproverId, ChainId, ChainStep, ConsensusType, EscalationPolicy,
};
pub use domain::document::{Document, DocumentId, FieldValue, KnownField};
pub use domain::escalation::{EscalationEvent, SYSTEM_ACTOR};
pub use domain::request::{
    ApprovalRequest, Decision, DecisionOutcome, RequestId, RequestStatus, StepProgress,
};
pub use errors::{EngineError, InterfaceError};
pub use escalation::{EscalationSettings, ReminderLedger, SweepAction};
pub use metrics::RequestMetrics;
pub use offline::{OfflineDecisionQueue, QueuedDecision, ReplayReport};
pub use requests::{ApprovalService, HistoryEntry, RequestHistory, SubmissionOutcome, SweepReport};
pub use routing::{RoutingEngine, RoutingOutcome, RoutingRule};
pub use rules::{ConditionOperator, LogicalOperator, RoutingCondition, RuleEvaluator};
pub use store::{InMemoryRequestStore, RequestStore};
