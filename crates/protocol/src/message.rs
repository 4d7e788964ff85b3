//! Kind-tagged control-plane messages and their payloads.

use meridian_core::{CommandId, DispatchId, NodeKey, RunId, SessionId, TaskId, TenantId, WorkerName};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A control-plane message: the frame's `kind` plus its payload.
///
/// Serialized adjacently tagged — `{"kind": "dispatch", "payload": {…}}` —
/// so unknown kinds and malformed payloads fail at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Message {
    /// Worker handshake.
    Hello(HelloPayload),
    /// Scheduler handshake confirmation.
    HelloAck(HelloAckPayload),
    /// Liveness probe.
    Ping,
    /// Liveness reply.
    Pong,
    /// Task dispatch to a worker.
    Dispatch(DispatchPayload),
    /// Worker confirmation that a dispatch was accepted.
    DispatchAck(DispatchAckPayload),
    /// Streaming progress update for a running task.
    Progress(ProgressPayload),
    /// Terminal task result.
    Result(ResultPayload),
    /// Scheduler-initiated cancel of a dispatched task.
    Cancel(CancelPayload),
    /// Worker-initiated cancel (gives the task back).
    WorkerCancel(WorkerCancelPayload),
    /// Admin command delivered to the worker.
    AdminCmd(AdminCmdPayload),
    /// Completion report for an admin command.
    AdminResult(AdminResultPayload),
    /// Pure acknowledgement frame (the ack rides the frame header).
    Ack,
    /// Session resume after reconnect.
    Resume(ResumePayload),
    /// Orderly close.
    Bye(ByePayload),
}

impl Message {
    /// The wire name of this message's kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::HelloAck(_) => "hello_ack",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Dispatch(_) => "dispatch",
            Self::DispatchAck(_) => "dispatch_ack",
            Self::Progress(_) => "progress",
            Self::Result(_) => "result",
            Self::Cancel(_) => "cancel",
            Self::WorkerCancel(_) => "worker_cancel",
            Self::AdminCmd(_) => "admin_cmd",
            Self::AdminResult(_) => "admin_result",
            Self::Ack => "ack",
            Self::Resume(_) => "resume",
            Self::Bye(_) => "bye",
        }
    }
}

/// Worker handshake payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Shared bearer token from the scheduler's allowlist.
    pub token: String,
    /// Unique worker name.
    pub worker_name: WorkerName,
    /// Node types this worker can execute.
    pub capabilities: Vec<String>,
    /// Installed packages, `name:version`.
    #[serde(default)]
    pub packages: Vec<String>,
    /// Logical queue label.
    pub queue: String,
    /// Prior session to resume, if reconnecting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_session_id: Option<SessionId>,
    /// Signed resume token issued with the prior session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<String>,
    /// Highest seq the worker has acknowledged on the prior session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_acked_seq: Option<u64>,
}

/// Scheduler handshake confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloAckPayload {
    /// Assigned (or resumed) session id.
    pub session_id: SessionId,
    /// Signed token the worker presents to resume this session.
    pub resume_token: String,
    /// Sliding-window size in effect.
    pub window_size: usize,
    /// Expected heartbeat interval, seconds.
    pub heartbeat_interval_seconds: u64,
}

/// Task dispatch payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPayload {
    /// Run the task belongs to.
    pub run_id: RunId,
    /// Tenant owning the run.
    pub tenant: TenantId,
    /// Node (or middleware) being executed.
    pub node_id: NodeKey,
    /// Task identifier, unique per attempt.
    pub task_id: TaskId,
    /// Node type to execute.
    pub node_type: String,
    /// Implementation package name.
    pub package_name: String,
    /// Implementation package version.
    pub package_version: String,
    /// Effective parameters at dispatch time.
    pub parameters: Map<String, Value>,
    /// Opaque resource references the task may read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_refs: Option<Value>,
    /// Placement affinity constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<String>,
    /// Key serialising tasks that must not run concurrently.
    pub concurrency_key: String,
    /// Session seq this dispatch was sent under.
    pub seq: u64,
    /// Dispatch identifier; idempotency token for `mark_dispatched`.
    pub dispatch_id: DispatchId,
    /// Host node, when this is a middleware hop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_node_id: Option<NodeKey>,
    /// The host's full middleware chain, when dispatching a hop or a host
    /// that carries one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middleware_chain: Vec<NodeKey>,
    /// Position of this hop in the chain. Absent on host dispatches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_index: Option<usize>,
}

/// Worker confirmation that a dispatch was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchAckPayload {
    /// Run the task belongs to.
    pub run_id: RunId,
    /// Acknowledged task.
    pub task_id: TaskId,
    /// The dispatch being acknowledged.
    pub dispatch_id: DispatchId,
}

/// Streaming progress update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    /// Run the task belongs to.
    pub run_id: RunId,
    /// Reporting task.
    pub task_id: TaskId,
    /// Fractional completion, `0.0..=1.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Free-form progress message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Terminal status a worker can report for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResultStatus {
    /// The task completed successfully.
    Succeeded,
    /// The task failed.
    Failed,
    /// The task was skipped by the worker.
    Skipped,
    /// The task was cancelled.
    Cancelled,
}

/// Structured error details in a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Terminal task result payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    /// Run the task belongs to.
    pub run_id: RunId,
    /// Completed task.
    pub task_id: TaskId,
    /// Terminal status.
    pub status: TaskResultStatus,
    /// Result document (written into the node's results on success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error details, when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Free-form execution metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Execution wall-clock duration, milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Scheduler-initiated cancel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelPayload {
    /// Run the task belongs to.
    pub run_id: RunId,
    /// Task to cancel.
    pub task_id: TaskId,
    /// Why the task is being cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Whether a worker-initiated cancel should be retried elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerCancelReason {
    /// Transient condition — reschedule on another worker.
    Transient,
    /// Permanent rejection — fail the node.
    Permanent,
}

/// Worker-initiated cancel payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCancelPayload {
    /// Run the task belongs to.
    pub run_id: RunId,
    /// Task being given back.
    pub task_id: TaskId,
    /// Transient or permanent.
    pub reason: WorkerCancelReason,
    /// Free-form explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Admin commands deliverable to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdminCommand {
    /// Stop accepting new tasks, complete current ones.
    #[serde(rename = "drain")]
    Drain,
    /// Move to a different logical queue.
    #[serde(rename = "rebind")]
    Rebind,
    /// Install a package.
    #[serde(rename = "pkg.install")]
    PkgInstall,
    /// Uninstall a package.
    #[serde(rename = "pkg.uninstall")]
    PkgUninstall,
}

/// Admin command payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminCmdPayload {
    /// Command tracking id.
    pub command_id: CommandId,
    /// The command to execute.
    pub command: AdminCommand,
    /// Command-specific arguments.
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// Terminal status of an admin command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminCommandStatus {
    /// Executed successfully.
    Succeeded,
    /// Execution failed.
    Failed,
}

/// Completion report for an admin command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminResultPayload {
    /// The command this result answers.
    pub command_id: CommandId,
    /// Terminal status.
    pub status: AdminCommandStatus,
    /// Free-form message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Session resume request (after transport reconnect).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePayload {
    /// The session to resume.
    pub session_id: SessionId,
    /// Signed resume token from the original `hello_ack`.
    pub resume_token: String,
    /// Highest seq the worker acknowledged before disconnecting.
    pub last_acked_seq: u64,
}

/// Orderly close payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByePayload {
    /// Close reason (`auth_failed`, `conflict`, `drained`, …).
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn kind_tags_are_snake_case() {
        let msg = Message::Ping;
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"kind": "ping"}));

        let msg = Message::WorkerCancel(WorkerCancelPayload {
            run_id: RunId::nil(),
            task_id: TaskId::nil(),
            reason: WorkerCancelReason::Transient,
            message: None,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "worker_cancel");
        assert_eq!(json["payload"]["reason"], "transient");
    }

    #[test]
    fn kind_accessor_matches_wire_tag() {
        let msg = Message::HelloAck(HelloAckPayload {
            session_id: SessionId::nil(),
            resume_token: "t".into(),
            window_size: 64,
            heartbeat_interval_seconds: 20,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], msg.kind());
    }

    #[test]
    fn unknown_kind_rejected() {
        let raw = json!({"kind": "teleport", "payload": {}});
        assert!(serde_json::from_value::<Message>(raw).is_err());
    }

    #[test]
    fn malformed_payload_rejected() {
        let raw = json!({"kind": "result", "payload": {"run_id": "not-a-uuid"}});
        assert!(serde_json::from_value::<Message>(raw).is_err());
    }

    #[test]
    fn admin_command_codes() {
        assert_eq!(
            serde_json::to_string(&AdminCommand::PkgInstall).unwrap(),
            "\"pkg.install\""
        );
        assert_eq!(
            serde_json::to_string(&AdminCommand::Drain).unwrap(),
            "\"drain\""
        );
    }

    #[test]
    fn result_payload_roundtrip() {
        let payload = ResultPayload {
            run_id: RunId::v4(),
            task_id: TaskId::v4(),
            status: TaskResultStatus::Succeeded,
            result: Some(json!({"value": 42})),
            error: None,
            metadata: None,
            duration_ms: Some(12),
        };
        let msg = Message::Result(payload.clone());
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Message::Result(payload));
    }

    #[test]
    fn dispatch_payload_host_omits_chain_fields() {
        let payload = DispatchPayload {
            run_id: RunId::v4(),
            tenant: TenantId::v4(),
            node_id: NodeKey::new("host").unwrap(),
            task_id: TaskId::v4(),
            node_type: "example.pkg.host".into(),
            package_name: "example.pkg".into(),
            package_version: "1.0.0".into(),
            parameters: Map::new(),
            resource_refs: None,
            affinity: None,
            concurrency_key: "run:host".into(),
            seq: 7,
            dispatch_id: DispatchId::v4(),
            host_node_id: None,
            middleware_chain: Vec::new(),
            chain_index: None,
        };
        let json = serde_json::to_value(Message::Dispatch(payload)).unwrap();
        assert!(json["payload"].get("chain_index").is_none());
        assert!(json["payload"].get("middleware_chain").is_none());
    }
}
