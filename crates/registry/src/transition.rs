//! State machine transition validation for runs and nodes.

use crate::error::RegistryError;
use crate::status::{NodeRunStatus, RunStatus};

/// Returns `true` if the run-level transition from `from` to `to` is valid.
#[must_use]
pub fn can_transition_run(from: RunStatus, to: RunStatus) -> bool {
    matches!(
        (from, to),
        (RunStatus::Queued, RunStatus::Running)
            | (RunStatus::Queued, RunStatus::Cancelled)
            | (RunStatus::Queued, RunStatus::Failed)
            | (RunStatus::Running, RunStatus::Succeeded)
            | (RunStatus::Running, RunStatus::Failed)
            | (RunStatus::Running, RunStatus::Cancelled)
    )
}

/// Validate a run-level transition, returning an error if invalid.
pub fn validate_run_transition(from: RunStatus, to: RunStatus) -> Result<(), RegistryError> {
    if can_transition_run(from, to) {
        Ok(())
    } else {
        Err(RegistryError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Returns `true` if the node-level transition from `from` to `to` is valid.
///
/// `Running → Queued` is the worker-cancel / dispatch-timeout reset;
/// `Failed → Queued` is the container retry path; `Queued → Failed` is a
/// host whose middleware chain failed before the host itself ran.
#[must_use]
pub fn can_transition_node(from: NodeRunStatus, to: NodeRunStatus) -> bool {
    matches!(
        (from, to),
        (NodeRunStatus::Queued, NodeRunStatus::Running)
            | (NodeRunStatus::Queued, NodeRunStatus::Skipped)
            | (NodeRunStatus::Queued, NodeRunStatus::Cancelled)
            | (NodeRunStatus::Queued, NodeRunStatus::Failed)
            | (NodeRunStatus::Running, NodeRunStatus::Succeeded)
            | (NodeRunStatus::Running, NodeRunStatus::Failed)
            | (NodeRunStatus::Running, NodeRunStatus::Skipped)
            | (NodeRunStatus::Running, NodeRunStatus::Cancelled)
            | (NodeRunStatus::Running, NodeRunStatus::Queued)
            | (NodeRunStatus::Failed, NodeRunStatus::Queued)
    )
}

/// Validate a node-level transition, returning an error if invalid.
pub fn validate_node_transition(
    from: NodeRunStatus,
    to: NodeRunStatus,
) -> Result<(), RegistryError> {
    if can_transition_node(from, to) {
        Ok(())
    } else {
        Err(RegistryError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
