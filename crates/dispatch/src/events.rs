//! State-change events the orchestrator surfaces to the API layer.

use meridian_core::{NodeKey, RunId, WorkerName};
use meridian_registry::{NodeRunStatus, RunStatus};
use serde::Serialize;

/// A control-plane state change, fanned out over SSE by the HTTP layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlEvent {
    /// A run changed status.
    RunStatusChanged {
        /// The run.
        run_id: RunId,
        /// New status.
        status: RunStatus,
    },
    /// A node (or middleware hop) changed status.
    NodeStatusChanged {
        /// The run.
        run_id: RunId,
        /// The node.
        node_id: NodeKey,
        /// New status.
        status: NodeRunStatus,
    },
    /// A worker's record changed (connect, disconnect, drain, heartbeat
    /// staleness).
    WorkerChanged {
        /// The worker.
        worker_name: WorkerName,
    },
    /// A dispatch was taken away from a worker and requeued.
    DispatchReassigned {
        /// The run.
        run_id: RunId,
        /// The node being reassigned.
        node_id: NodeKey,
        /// The worker that lost the task.
        from_worker: WorkerName,
    },
}
