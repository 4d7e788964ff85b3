#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Meridian Error
//!
//! The shared error taxonomy for the control plane.
//!
//! Every error that can surface to a caller maps onto an [`ErrorKind`]; the
//! kind fixes both the wire-level string code (`"bad_request"`, `"conflict"`,
//! …) and the HTTP status. [`ControlError`] carries the kind plus a
//! human-readable message and optional structured details, and renders into
//! the JSON payload shape shared by every endpoint:
//!
//! ```json
//! {"error": "conflict", "message": "…", "request_id": "…", "details": {…}}
//! ```

mod kind;
mod payload;

pub use kind::ErrorKind;
pub use payload::ErrorPayload;

use serde_json::Value;
use thiserror::Error;

/// A surfaced control-plane error: a kind, a message, optional details.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ControlError {
    /// Classification driving the wire code and HTTP status.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Optional structured context echoed to the caller.
    pub details: Option<Value>,
}

impl ControlError {
    /// Create an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Render into the shared payload shape.
    #[must_use]
    pub fn to_payload(&self, request_id: Option<String>) -> ErrorPayload {
        ErrorPayload {
            error: self.kind.code().to_string(),
            message: self.message.clone(),
            request_id,
            details: self.details.clone(),
        }
    }
}

/// Result alias used across the control plane.
pub type ControlResult<T> = Result<T, ControlError>;

macro_rules! constructor {
    ($(#[$doc:meta])* $name:ident, $kind:ident) => {
        $(#[$doc])*
        #[must_use]
        pub fn $name(message: impl Into<String>) -> ControlError {
            ControlError::new(ErrorKind::$kind, message)
        }
    };
}

constructor! {
    /// Malformed input.
    bad_request, BadRequest
}
constructor! {
    /// Missing or invalid credentials.
    unauthorized, Unauthorized
}
constructor! {
    /// Authenticated but not permitted.
    forbidden, Forbidden
}
constructor! {
    /// The referenced resource does not exist.
    not_found, NotFound
}
constructor! {
    /// Idempotency or uniqueness violation.
    conflict, Conflict
}
constructor! {
    /// The workflow snapshot failed validation.
    invalid_workflow, InvalidWorkflow
}
constructor! {
    /// No eligible worker in the selection window.
    worker_unavailable, WorkerUnavailable
}
constructor! {
    /// A dispatch was never acknowledged in time.
    dispatch_timeout, DispatchTimeout
}
constructor! {
    /// Unexpected internal failure.
    internal_error, Internal
}
