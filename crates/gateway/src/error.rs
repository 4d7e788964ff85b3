//! Gateway error types.

use meridian_core::{SessionId, WorkerName};
use thiserror::Error;

/// Errors raised by session and gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The presented worker token is not on the allowlist.
    #[error("auth_failed: worker token rejected")]
    AuthFailed,

    /// The worker name is already bound to a live session.
    #[error("conflict: worker {0} already has an active session")]
    Conflict(WorkerName),

    /// The referenced session does not exist (or has been destroyed).
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The resume token failed verification or expired.
    #[error("resume rejected: {0}")]
    ResumeRejected(&'static str),

    /// The session was closed while an operation was in flight.
    #[error("session closed")]
    SessionClosed,

    /// No live session is bound to the worker.
    #[error("worker not connected: {0}")]
    WorkerNotConnected(WorkerName),

    /// Frame encoding or decoding failed.
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),

    /// The underlying transport is gone.
    #[error("transport closed")]
    TransportClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let name = WorkerName::new("w1").unwrap();
        assert_eq!(
            GatewayError::Conflict(name).to_string(),
            "conflict: worker w1 already has an active session"
        );
        assert_eq!(GatewayError::AuthFailed.to_string(), "auth_failed: worker token rejected");
    }
}
