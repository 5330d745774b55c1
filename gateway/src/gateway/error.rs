//! Error taxonomy for the gateway.
//!
//! Only terminal outcomes cross the gateway boundary; per-attempt failures
//! (`BackendError`, a single timed-out attempt) are consumed by the retry
//! loop and show up in `AllAttemptsFailed` as attempt records.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// A single failed dispatch attempt, kept for terminal reporting.
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub instance_id: String,
    pub reason: String,
}

/// Errors from the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No registered instance serves the requested model.
    #[error("no instance available for model '{0}'")]
    InstanceUnavailable(String),

    /// Admission control rejection; backpressure, not degradation.
    #[error("queue is full ({depth} pending)")]
    QueueFull { depth: usize },

    /// The request exceeded its deadline, queued or mid-execution.
    #[error("request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// One instance failed one attempt. Retried, never surfaced alone.
    #[error("instance '{instance_id}' failed: {reason}")]
    BackendError {
        instance_id: String,
        reason: String,
    },

    /// Retries exhausted across the fleet.
    #[error("all {} attempts failed: {}", .attempts.len(), summarize(.attempts))]
    AllAttemptsFailed { attempts: Vec<AttemptFailure> },

    #[error("instance '{0}' is already registered")]
    DuplicateInstance(String),

    #[error("unknown instance '{0}'")]
    UnknownInstance(String),

    /// Registration gave no endpoint and the catalog has none for the model.
    #[error("no endpoint known for model '{0}'")]
    MissingEndpoint(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

fn summarize(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.instance_id, a.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            GatewayError::InstanceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "instance_unavailable")
            }
            GatewayError::QueueFull { .. } => (StatusCode::TOO_MANY_REQUESTS, "queue_full"),
            GatewayError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            GatewayError::BackendError { .. } => (StatusCode::BAD_GATEWAY, "backend_error"),
            GatewayError::AllAttemptsFailed { .. } => {
                (StatusCode::BAD_GATEWAY, "all_attempts_failed")
            }
            GatewayError::DuplicateInstance(_) => (StatusCode::CONFLICT, "duplicate_instance"),
            GatewayError::UnknownInstance(_) => (StatusCode::NOT_FOUND, "unknown_instance"),
            GatewayError::MissingEndpoint(_) => (StatusCode::BAD_REQUEST, "missing_endpoint"),
            GatewayError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            GatewayError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string()
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_attempts_failed_lists_instances() {
        let err = GatewayError::AllAttemptsFailed {
            attempts: vec![
                AttemptFailure {
                    instance_id: "i-1".to_string(),
                    reason: "HTTP 500".to_string(),
                },
                AttemptFailure {
                    instance_id: "i-2".to_string(),
                    reason: "attempt timed out".to_string(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("all 2 attempts failed"));
        assert!(msg.contains("i-1: HTTP 500"));
        assert!(msg.contains("i-2: attempt timed out"));
    }

    #[test]
    fn test_queue_full_message() {
        let err = GatewayError::QueueFull { depth: 64 };
        assert_eq!(err.to_string(), "queue is full (64 pending)");
    }
}
