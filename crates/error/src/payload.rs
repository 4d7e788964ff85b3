//! The JSON error payload shared by every HTTP endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire shape of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Stable error code (`"bad_request"`, `"conflict"`, …).
    pub error: String,
    /// Human-readable description.
    pub message: String,
    /// Request correlation id, when one was assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Structured context (e.g. the offending idempotency key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}
