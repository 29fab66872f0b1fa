use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use signoff_core::{
    ApprovalRequest, ApproverId, ChainId, DecisionOutcome, Document, DocumentId, EngineError,
    EscalationEvent, FieldValue, InterfaceError, RequestHistory, RequestId, RequestMetrics,
    RoutingOutcome, SubmissionOutcome,
};

use crate::bootstrap::EngineService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EngineService>,
    pub chain_count: usize,
    pub rule_count: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/route", post(route_document))
        .route("/requests", post(create_request))
        .route("/requests/{id}/decide", post(decide))
        .route("/requests/{id}/escalate", post(escalate))
        .route("/requests/{id}/cancel", post(cancel))
        .route("/requests/{id}/reopen", post(reopen))
        .route("/requests/{id}/delegate", post(delegate_approver))
        .route("/requests/{id}/history", get(history))
        .route("/requests/{id}/metrics", get(metrics))
        .with_state(state)
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

fn error_response(error: EngineError, correlation_id: String) -> ApiError {
    let interface = error.into_interface(correlation_id);
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ErrorBody {
        error: interface.to_string(),
        message: interface.user_message().to_string(),
        correlation_id: interface.correlation_id().to_string(),
    };
    (status, Json(body))
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub chains: usize,
    pub rules: usize,
    pub checked_at: String,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let ready = state.chain_count > 0;
    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        chains: state.chain_count,
        rules: state.rule_count,
        checked_at: Utc::now().to_rfc3339(),
    };
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(payload))
}

/// Inline document fields as routing sees them; `metadata` accepts
/// arbitrary JSON scalars and lists.
#[derive(Clone, Debug, Deserialize)]
pub struct DocumentPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub title: String,
    pub value: f64,
    pub department: String,
    pub confidentiality: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl From<DocumentPayload> for Document {
    fn from(payload: DocumentPayload) -> Self {
        Self {
            id: DocumentId(payload.id),
            doc_type: payload.doc_type,
            title: payload.title,
            value: payload.value,
            department: payload.department,
            confidentiality: payload.confidentiality,
            metadata: payload
                .metadata
                .into_iter()
                .map(|(key, value)| (key, FieldValue::from(value)))
                .collect(),
        }
    }
}

pub async fn route_document(
    State(state): State<AppState>,
    Json(payload): Json<DocumentPayload>,
) -> ApiResult<RoutingOutcome> {
    let document = Document::from(payload);
    state
        .service
        .route_document(&document)
        .map(Json)
        .map_err(|error| error_response(error, correlation_id()))
}

#[derive(Clone, Debug, Deserialize)]
pub struct CreateRequestBody {
    pub document_id: String,
    #[serde(default)]
    pub chain_id: Option<String>,
}

pub async fn create_request(
    State(state): State<AppState>,
    Json(body): Json<CreateRequestBody>,
) -> Result<(StatusCode, Json<ApprovalRequest>), ApiError> {
    state
        .service
        .create_request(
            &DocumentId(body.document_id),
            body.chain_id.map(ChainId),
            Utc::now(),
        )
        .map(|request| (StatusCode::CREATED, Json(request)))
        .map_err(|error| error_response(error, correlation_id()))
}

#[derive(Clone, Debug, Deserialize)]
pub struct DecideBody {
    pub approver_id: String,
    pub outcome: DecisionOutcome,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecideResponse {
    pub request: ApprovalRequest,
    pub submission: SubmissionOutcome,
    /// Non-fatal warning flag: the decision arrived after its step had
    /// already resolved and was kept for audit only.
    pub late: bool,
}

pub async fn decide(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DecideBody>,
) -> ApiResult<DecideResponse> {
    state
        .service
        .decide(
            &RequestId(id),
            &ApproverId(body.approver_id),
            body.outcome,
            body.comment,
            Utc::now(),
        )
        .map(|(request, submission)| {
            let late = matches!(submission, SubmissionOutcome::LateRecorded);
            Json(DecideResponse { request, submission, late })
        })
        .map_err(|error| error_response(error, correlation_id()))
}

#[derive(Clone, Debug, Deserialize)]
pub struct EscalateBody {
    pub by_user: String,
    pub reason: String,
}

pub async fn escalate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<EscalateBody>,
) -> ApiResult<EscalationEvent> {
    state
        .service
        .manual_escalate(&RequestId(id), &body.by_user, &body.reason, Utc::now())
        .map(Json)
        .map_err(|error| error_response(error, correlation_id()))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ApprovalRequest> {
    state
        .service
        .cancel(&RequestId(id))
        .map(Json)
        .map_err(|error| error_response(error, correlation_id()))
}

pub async fn reopen(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ApprovalRequest> {
    state
        .service
        .reopen(&RequestId(id), Utc::now())
        .map(Json)
        .map_err(|error| error_response(error, correlation_id()))
}

#[derive(Clone, Debug, Deserialize)]
pub struct DelegateBody {
    pub from: String,
    pub to: String,
}

pub async fn delegate_approver(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DelegateBody>,
) -> ApiResult<ApprovalRequest> {
    state
        .service
        .delegate(&RequestId(id), &ApproverId(body.from), &ApproverId(body.to))
        .map(Json)
        .map_err(|error| error_response(error, correlation_id()))
}

pub async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<RequestHistory> {
    state
        .service
        .history(&RequestId(id))
        .map(Json)
        .map_err(|error| error_response(error, correlation_id()))
}

pub async fn metrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<RequestMetrics> {
    state
        .service
        .metrics(&RequestId(id), Utc::now())
        .map(Json)
        .map_err(|error| error_response(error, correlation_id()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::Json;
    use signoff_core::{
        ApprovalChain, ApprovalService, ApproverId, ChainId, ChainStep, ConsensusType,
        DecisionOutcome, Document, DocumentId, InMemoryDocumentSource, InMemoryRequestStore,
        RequestStatus, SubmissionOutcome,
    };

    use super::{
        cancel, create_request, decide, escalate, health, metrics, route_document, AppState,
        CreateRequestBody, DecideBody, DocumentPayload, EscalateBody,
    };

    fn state() -> AppState {
        let chain = ApprovalChain {
            id: ChainId("invoice-review".to_string()),
            name: "Invoice review".to_string(),
            steps: vec![ChainStep {
                number: 1,
                name: "review".to_string(),
                approver_ids: vec![ApproverId("alice".to_string())],
                parallel: false,
                consensus: ConsensusType::Any,
                weights: BTreeMap::new(),
                timeout_days: Some(2),
                escalation_chain: vec![ApproverId("lead".to_string())],
                is_optional: false,
            }],
            active: true,
            escalation_policy: Default::default(),
        };
        let documents = InMemoryDocumentSource::with_documents(vec![Document {
            id: DocumentId("doc-1".to_string()),
            doc_type: "invoice".to_string(),
            title: "Invoice".to_string(),
            value: 10.0,
            department: "finance".to_string(),
            confidentiality: "internal".to_string(),
            metadata: BTreeMap::new(),
        }]);
        let service =
            ApprovalService::new(InMemoryRequestStore::default(), vec![chain], Vec::new())
                .with_documents(Arc::new(documents));
        AppState { service: Arc::new(service), chain_count: 1, rule_count: 0 }
    }

    fn payload(doc_type: &str) -> DocumentPayload {
        DocumentPayload {
            id: "doc-inline".to_string(),
            doc_type: doc_type.to_string(),
            title: "t".to_string(),
            value: 5.0,
            department: "ops".to_string(),
            confidentiality: "internal".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn health_reports_ready_with_loaded_definitions() {
        let (status, Json(body)) = health(State(state())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ready");
        assert_eq!(body.chains, 1);
    }

    #[tokio::test]
    async fn routing_falls_back_to_the_type_named_chain() {
        let Json(outcome) = route_document(State(state()), Json(payload("invoice")))
            .await
            .expect("default routing should resolve");

        assert_eq!(outcome.chain_id.0, "invoice-review");
        assert_eq!(outcome.reason, "Default routing for document type");
    }

    #[tokio::test]
    async fn unroutable_documents_return_bad_request() {
        let (status, Json(body)) = route_document(State(state()), Json(payload("memo")))
            .await
            .expect_err("memo has no chain");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.contains("no approval chain available"));
    }

    #[tokio::test]
    async fn decide_endpoint_walks_a_request_to_approved() {
        let state = state();
        let (status, Json(request)) = create_request(
            State(state.clone()),
            Json(CreateRequestBody {
                document_id: "doc-1".to_string(),
                chain_id: None,
            }),
        )
        .await
        .expect("request should create");
        assert_eq!(status, StatusCode::CREATED);

        let Json(response) = decide(
            State(state.clone()),
            Path(request.id.0.clone()),
            Json(DecideBody {
                approver_id: "alice".to_string(),
                outcome: DecisionOutcome::Approve,
                comment: None,
            }),
        )
        .await
        .expect("decision should apply");

        assert_eq!(response.request.status, RequestStatus::Approved);
        assert!(!response.late);
        assert!(matches!(response.submission, SubmissionOutcome::Completed { .. }));

        let Json(progress) = metrics(State(state), Path(request.id.0.clone()))
            .await
            .expect("metrics");
        assert_eq!(progress.completion_pct, 100);
    }

    #[tokio::test]
    async fn unknown_approver_is_forbidden() {
        let state = state();
        let (_, Json(request)) = create_request(
            State(state.clone()),
            Json(CreateRequestBody { document_id: "doc-1".to_string(), chain_id: None }),
        )
        .await
        .expect("request");

        let (status, _) = decide(
            State(state),
            Path(request.id.0.clone()),
            Json(DecideBody {
                approver_id: "mallory".to_string(),
                outcome: DecisionOutcome::Approve,
                comment: None,
            }),
        )
        .await
        .expect_err("mallory is not an approver");

        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn blank_escalation_reason_is_a_bad_request() {
        let state = state();
        let (_, Json(request)) = create_request(
            State(state.clone()),
            Json(CreateRequestBody { document_id: "doc-1".to_string(), chain_id: None }),
        )
        .await
        .expect("request");

        let (status, Json(body)) = escalate(
            State(state),
            Path(request.id.0.clone()),
            Json(EscalateBody { by_user: "ops".to_string(), reason: "  ".to_string() }),
        )
        .await
        .expect_err("blank reason");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.contains("reason"));
    }

    #[tokio::test]
    async fn cancelling_twice_conflicts() {
        let state = state();
        let (_, Json(request)) = create_request(
            State(state.clone()),
            Json(CreateRequestBody { document_id: "doc-1".to_string(), chain_id: None }),
        )
        .await
        .expect("request");

        cancel(State(state.clone()), Path(request.id.0.clone()))
            .await
            .expect("first cancel");
        let (status, _) = cancel(State(state), Path(request.id.0.clone()))
            .await
            .expect_err("second cancel conflicts");

        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn missing_requests_are_not_found() {
        let (status, _) = cancel(State(state()), Path("nope".to_string()))
            .await
            .expect_err("unknown request");

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
