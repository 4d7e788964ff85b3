//! Reserved middleware-next error codes.
//!
//! A middleware hop that refuses to advance its host's chain reports one of
//! these codes; the registry surfaces the code on the failed run.

use serde::{Deserialize, Serialize};

/// Reserved `next_*` error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextErrorCode {
    /// The run is already in a final status.
    NextRunFinalised,
    /// The same next request was already processed.
    NextDuplicate,
    /// The host has no middleware chain.
    NextNoChain,
    /// The chain index is out of range or names the wrong hop.
    NextInvalidChain,
    /// The target node is not ready to advance.
    NextTargetNotReady,
    /// The next request timed out.
    NextTimeout,
    /// The next request was cancelled.
    NextCancelled,
    /// The next request was rejected.
    NextUnavailable,
}

impl NextErrorCode {
    /// All reserved codes.
    pub const ALL: [Self; 8] = [
        Self::NextRunFinalised,
        Self::NextDuplicate,
        Self::NextNoChain,
        Self::NextInvalidChain,
        Self::NextTargetNotReady,
        Self::NextTimeout,
        Self::NextCancelled,
        Self::NextUnavailable,
    ];

    /// The stable wire code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NextRunFinalised => "next_run_finalised",
            Self::NextDuplicate => "next_duplicate",
            Self::NextNoChain => "next_no_chain",
            Self::NextInvalidChain => "next_invalid_chain",
            Self::NextTargetNotReady => "next_target_not_ready",
            Self::NextTimeout => "next_timeout",
            Self::NextCancelled => "next_cancelled",
            Self::NextUnavailable => "next_unavailable",
        }
    }

    /// Canonical human-readable message for the code.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::NextRunFinalised => "run already in final status",
            Self::NextDuplicate => "duplicate next request",
            Self::NextNoChain => "middleware chain not found",
            Self::NextInvalidChain => "invalid chain index",
            Self::NextTargetNotReady => "target node not ready",
            Self::NextTimeout => "next request timed out",
            Self::NextCancelled => "next request cancelled",
            Self::NextUnavailable => "next request rejected",
        }
    }

    /// Parse a wire code.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }
}

impl std::fmt::Display for NextErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
