//! Error classification.

use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Classification of every error the control plane can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input.
    BadRequest,
    /// Missing or invalid credentials.
    Unauthorized,
    /// Authenticated but lacking a required role.
    Forbidden,
    /// Referenced resource does not exist.
    NotFound,
    /// Idempotency or uniqueness violation.
    Conflict,
    /// Snapshot failed validation; no run was created.
    InvalidWorkflow,
    /// No worker satisfied the selection filter.
    WorkerUnavailable,
    /// Dispatch acknowledgement never arrived.
    DispatchTimeout,
    /// A worker gave the task back for a transient reason.
    WorkerCancelledTransient,
    /// A worker rejected the task permanently.
    WorkerCancelledPermanent,
    /// Unexpected internal failure.
    Internal,
}

impl ErrorKind {
    /// The stable string code used in error payloads.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InvalidWorkflow => "invalid_workflow",
            Self::WorkerUnavailable => "worker_unavailable",
            Self::DispatchTimeout => "dispatch_timeout",
            Self::WorkerCancelledTransient => "worker_cancelled_transient",
            Self::WorkerCancelledPermanent => "worker_cancelled_permanent",
            Self::Internal => "internal_error",
        }
    }

    /// The HTTP status this kind maps onto when surfaced over REST.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest | Self::InvalidWorkflow => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::WorkerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::DispatchTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::WorkerCancelledTransient | Self::WorkerCancelledPermanent | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorKind::BadRequest.code(), "bad_request");
        assert_eq!(ErrorKind::InvalidWorkflow.code(), "invalid_workflow");
        assert_eq!(ErrorKind::Internal.code(), "internal_error");
        assert_eq!(
            ErrorKind::WorkerCancelledTransient.code(),
            "worker_cancelled_transient"
        );
    }

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorKind::BadRequest.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorKind::WorkerUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorKind::DispatchTimeout.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn serde_uses_snake_case_codes() {
        let json = serde_json::to_string(&ErrorKind::InvalidWorkflow).unwrap();
        assert_eq!(json, "\"invalid_workflow\"");
    }

    #[test]
    fn display_matches_code() {
        assert_eq!(ErrorKind::Conflict.to_string(), "conflict");
    }
}
