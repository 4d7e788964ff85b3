//! Run- and node-level status tracking.

use serde::{Deserialize, Serialize};

/// The overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created but nothing dispatched yet.
    Queued,
    /// At least one node has been dispatched.
    Running,
    /// All nodes terminal, no failures, at least one sink succeeded.
    Succeeded,
    /// A non-optional node failed, or no sink succeeded.
    Failed,
    /// Explicitly cancelled by a caller.
    Cancelled,
}

impl RunStatus {
    /// Returns `true` once the run has reached a final state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The execution status of a single node (or middleware hop).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    /// Waiting for inputs or a worker.
    Queued,
    /// Dispatched to a worker.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Failed permanently.
    Failed,
    /// Never ran because an upstream dependency failed.
    Skipped,
    /// Cancelled before or during execution.
    Cancelled,
}

impl NodeRunStatus {
    /// Returns `true` once the node has reached a final state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }
}

impl std::fmt::Display for NodeRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
