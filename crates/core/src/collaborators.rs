use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::domain::chain::ApproverId;
use crate::domain::document::{Document, DocumentId};

/// Read access to the external document store; the engine only ever needs
/// the routed fields, never the content.
pub trait DocumentSource: Send + Sync {
    fn fields(&self, document_id: &DocumentId) -> Option<Document>;
}

#[derive(Clone, Default)]
pub struct InMemoryDocumentSource {
    documents: Arc<Mutex<HashMap<DocumentId, Document>>>,
}

impl InMemoryDocumentSource {
    pub fn with_documents(documents: Vec<Document>) -> Self {
        let source = Self::default();
        for document in documents {
            source.put(document);
        }
        source
    }

    pub fn put(&self, document: Document) {
        match self.documents.lock() {
            Ok(mut documents) => {
                documents.insert(document.id.clone(), document);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(document.id.clone(), document);
            }
        }
    }
}

impl DocumentSource for InMemoryDocumentSource {
    fn fields(&self, document_id: &DocumentId) -> Option<Document> {
        match self.documents.lock() {
            Ok(documents) => documents.get(document_id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(document_id).cloned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverProfile {
    pub id: ApproverId,
    pub display_name: String,
    pub email: String,
    /// Default weight for weighted consensus when a step does not carry
    /// its own weight entry for this approver.
    pub weight: Option<u32>,
}

/// Identity/auth collaborator; resolves approver ids for display and for
/// weighted consensus defaults.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, approver_id: &ApproverId) -> Option<ApproverProfile>;
}

#[derive(Clone, Default)]
pub struct InMemoryIdentityResolver {
    profiles: Arc<Mutex<HashMap<ApproverId, ApproverProfile>>>,
}

impl InMemoryIdentityResolver {
    pub fn with_profiles(profiles: Vec<ApproverProfile>) -> Self {
        let resolver = Self::default();
        for profile in profiles {
            resolver.put(profile);
        }
        resolver
    }

    pub fn put(&self, profile: ApproverProfile) {
        match self.profiles.lock() {
            Ok(mut profiles) => {
                profiles.insert(profile.id.clone(), profile);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(profile.id.clone(), profile);
            }
        }
    }
}

impl IdentityResolver for InMemoryIdentityResolver {
    fn resolve(&self, approver_id: &ApproverId) -> Option<ApproverProfile> {
        match self.profiles.lock() {
            Ok(profiles) => profiles.get(approver_id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(approver_id).cloned(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderChannel {
    Email,
    Chat,
    Mobile,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderContext {
    pub request_id: String,
    pub step_number: u32,
    pub escalation_level: u32,
    pub message: String,
}

/// Fire-and-forget notification trigger. Delivery transport is an
/// external collaborator; a send failure never rolls back the state
/// change that prompted it.
pub trait ReminderSink: Send + Sync {
    fn send(&self, approver_id: &ApproverId, channel: ReminderChannel, context: &ReminderContext);
}

#[derive(Clone, Default)]
pub struct InMemoryReminderSink {
    sent: Arc<Mutex<Vec<(ApproverId, ReminderChannel, ReminderContext)>>>,
}

impl InMemoryReminderSink {
    pub fn sent(&self) -> Vec<(ApproverId, ReminderChannel, ReminderContext)> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ReminderSink for InMemoryReminderSink {
    fn send(&self, approver_id: &ApproverId, channel: ReminderChannel, context: &ReminderContext) {
        let entry = (approver_id.clone(), channel, context.clone());
        match self.sent.lock() {
            Ok(mut sent) => sent.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

/// Logs reminders through tracing; the default sink for deployments where
/// the real transport hangs off the log pipeline or is not wired yet.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReminderSink;

impl ReminderSink for TracingReminderSink {
    fn send(&self, approver_id: &ApproverId, channel: ReminderChannel, context: &ReminderContext) {
        tracing::info!(
            event_name = "reminder.dispatched",
            approver_id = %approver_id.0,
            channel = ?channel,
            request_id = %context.request_id,
            step_number = context.step_number,
            escalation_level = context.escalation_level,
            "reminder dispatched"
        );
    }
}
