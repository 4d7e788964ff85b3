//! Dispatch error types.

use meridian_core::NodeKey;
use meridian_gateway::GatewayError;
use meridian_protocol::NextErrorCode;
use meridian_registry::RegistryError;
use thiserror::Error;

/// Errors raised while orchestrating dispatches.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No worker satisfied the selection filter.
    #[error("no eligible worker for node {0}")]
    NoWorkerAvailable(NodeKey),

    /// Middleware chain invariants failed before send.
    #[error("chain validation failed: {0}")]
    InvalidChain(NextErrorCode),

    /// The gateway refused the send.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The registry refused the transition.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let err = DispatchError::NoWorkerAvailable(NodeKey::new("a").unwrap());
        assert_eq!(err.to_string(), "no eligible worker for node a");

        let err = DispatchError::InvalidChain(NextErrorCode::NextInvalidChain);
        assert_eq!(err.to_string(), "chain validation failed: next_invalid_chain");
    }
}
