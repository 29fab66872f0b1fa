use std::sync::Arc;

use signoff_core::config::{AppConfig, ConfigError};
use signoff_core::{
    ApprovalService, AuditEvent, AuditSink, Definitions, EngineError, InMemoryDocumentSource,
    InMemoryIdentityResolver, InMemoryRequestStore, TracingReminderSink,
};
use thiserror::Error;
use tracing::info;

pub type EngineService = ApprovalService<InMemoryRequestStore>;

pub struct Application {
    pub config: AppConfig,
    pub service: Arc<EngineService>,
    pub chain_count: usize,
    pub rule_count: usize,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("definitions failed to load: {0}")]
    Definitions(#[from] EngineError),
}

/// Emits every audit event to the log pipeline; the durable audit store
/// is an external collaborator behind the same trait.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = %event.event_type,
            correlation_id = %event.correlation_id,
            request_id = event.request_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
            category = ?event.category,
            actor = %event.actor,
            outcome = ?event.outcome,
            "audit event"
        );
    }
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        definitions_path = %config.definitions.path.display(),
        "starting application bootstrap"
    );

    let definitions = Definitions::load(&config.definitions.path)?;
    let chain_count = definitions.chains.len();
    let rule_count = definitions.rules.len();

    let service = ApprovalService::new(
        InMemoryRequestStore::default(),
        definitions.chains,
        definitions.rules,
    )
    .with_documents(Arc::new(InMemoryDocumentSource::with_documents(definitions.documents)))
    .with_identities(Arc::new(InMemoryIdentityResolver::with_profiles(definitions.approvers)))
    .with_audit(Arc::new(TracingAuditSink))
    .with_reminders(Arc::new(TracingReminderSink))
    .with_settings(config.scheduler.escalation_settings());

    info!(
        event_name = "system.bootstrap.definitions_loaded",
        correlation_id = "bootstrap",
        chains = chain_count,
        rules = rule_count,
        "approval definitions loaded"
    );

    Ok(Application { config, service: Arc::new(service), chain_count, rule_count })
}
