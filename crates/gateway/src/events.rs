//! Events the gateway surfaces to the orchestrator.

use meridian_core::{SessionId, WorkerName};
use meridian_protocol::{
    AdminResultPayload, DispatchAckPayload, ProgressPayload, ResultPayload, WorkerCancelPayload,
};

/// Something the orchestrator (or API event hub) needs to react to.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// A worker completed a fresh handshake.
    WorkerConnected {
        /// The worker that connected.
        worker_name: WorkerName,
    },
    /// A worker resumed its prior session within grace.
    WorkerResumed {
        /// The worker that resumed.
        worker_name: WorkerName,
        /// The resumed session.
        session_id: SessionId,
        /// Frames replayed during resume.
        replayed: usize,
    },
    /// A worker's transport dropped; its session awaits resume.
    WorkerDisconnected {
        /// The worker that lost its transport.
        worker_name: WorkerName,
        /// The affected session.
        session_id: SessionId,
    },
    /// A disconnected session outlived its grace window and was destroyed.
    /// In-flight tasks of this worker must be rescheduled.
    SessionExpired {
        /// The worker whose session expired.
        worker_name: WorkerName,
        /// The destroyed session.
        session_id: SessionId,
    },
    /// A worker acknowledged a dispatch.
    DispatchAcked {
        /// The acknowledging worker.
        worker_name: WorkerName,
        /// Ack payload.
        payload: DispatchAckPayload,
    },
    /// A worker reported a terminal task result.
    TaskResult {
        /// The reporting worker.
        worker_name: WorkerName,
        /// Result payload.
        payload: ResultPayload,
    },
    /// A worker reported task progress.
    TaskProgress {
        /// The reporting worker.
        worker_name: WorkerName,
        /// Progress payload.
        payload: ProgressPayload,
    },
    /// A worker gave a task back.
    WorkerCancelled {
        /// The cancelling worker.
        worker_name: WorkerName,
        /// Cancel payload.
        payload: WorkerCancelPayload,
    },
    /// A worker finished an admin command.
    AdminResult {
        /// The reporting worker.
        worker_name: WorkerName,
        /// Command result payload.
        payload: AdminResultPayload,
    },
}
