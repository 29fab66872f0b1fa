use thiserror::Error;

use crate::domain::request::RequestStatus;

/// Core engine taxonomy. Every component except the rule evaluator
/// returns these explicitly; the evaluator degrades malformed comparisons
/// to `false` instead.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("no approval chain available for document `{document_id}`")]
    NoChainAvailable { document_id: String },
    #[error("invalid state transition for request `{request_id}` ({status:?}): {reason}")]
    InvalidStateTransition { request_id: String, status: RequestStatus, reason: String },
    #[error("approver `{approver_id}` is not eligible for step {step_number} of request `{request_id}`")]
    UnauthorizedApprover { request_id: String, step_number: u32, approver_id: String },
    #[error("stale decision for request `{request_id}` step {step_number}: {reason}")]
    StaleDecision { request_id: String, step_number: u32, reason: String },
    #[error("request not found: `{0}`")]
    RequestNotFound(String),
    #[error("chain not found: `{0}`")]
    ChainNotFound(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "This identity is not allowed to act on the current step.",
            Self::NotFound { .. } => "The requested resource does not exist.",
            Self::Conflict { .. } => {
                "The request state changed underneath this operation. Reload and retry."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl EngineError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<EngineError> for InterfaceError {
    fn from(value: EngineError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            EngineError::Validation(_) | EngineError::NoChainAvailable { .. } => {
                Self::BadRequest { message, correlation_id }
            }
            EngineError::UnauthorizedApprover { .. } => Self::Forbidden { message, correlation_id },
            EngineError::RequestNotFound(_) | EngineError::ChainNotFound(_) => {
                Self::NotFound { message, correlation_id }
            }
            EngineError::InvalidStateTransition { .. } | EngineError::StaleDecision { .. } => {
                Self::Conflict { message, correlation_id }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineError, InterfaceError};
    use crate::domain::request::RequestStatus;

    #[test]
    fn validation_error_maps_to_bad_request_with_correlation_id() {
        let interface = EngineError::Validation("escalation reason must not be blank".to_owned())
            .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn terminal_transition_maps_to_conflict() {
        let interface = EngineError::InvalidStateTransition {
            request_id: "r-9".to_owned(),
            status: RequestStatus::Approved,
            reason: "request is terminal".to_owned(),
        }
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn unauthorized_approver_maps_to_forbidden() {
        let interface = EngineError::UnauthorizedApprover {
            request_id: "r-1".to_owned(),
            step_number: 2,
            approver_id: "mallory".to_owned(),
        }
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Forbidden { .. }));
    }

    #[test]
    fn missing_request_maps_to_not_found() {
        let interface = EngineError::RequestNotFound("r-404".to_owned()).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::NotFound { .. }));
        assert_eq!(interface.user_message(), "The requested resource does not exist.");
    }
}
