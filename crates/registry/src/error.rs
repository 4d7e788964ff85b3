//! Registry error types.

use meridian_core::{NodeKey, RunId, TaskId};
use meridian_workflow::WorkflowError;
use thiserror::Error;

/// Errors raised by run-registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The snapshot failed validation; no run was created.
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(#[from] WorkflowError),

    /// The referenced run does not exist.
    #[error("run not found: {0}")]
    RunNotFound(RunId),

    /// A run with this id already exists.
    #[error("run already exists: {0}")]
    RunExists(RunId),

    /// The referenced node does not exist in the run.
    #[error("node not found: {0}")]
    NodeNotFound(NodeKey),

    /// No node in the run carries the given task id.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// A state transition is not valid for the current status.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Attempted target status.
        to: String,
    },

    /// The run is finalised; the operation was refused.
    #[error("run {0} is finalised")]
    Finalised(RunId),

    /// A dispatch id was reused for a different node or task.
    #[error("dispatch id conflict on node {0}")]
    DispatchConflict(NodeKey),
}
