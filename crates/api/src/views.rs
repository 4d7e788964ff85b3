//! Serializable API views over internal records.

use chrono::{DateTime, Utc};
use meridian_core::RunId;
use meridian_gateway::{WorkerRecord, WorkerStatus};
use meridian_protocol::ErrorInfo;
use meridian_registry::{NodeRunState, NodeRunStatus, RunRecord, RunStatus};
use serde::Serialize;
use serde_json::{Map, Value};

/// One node's externally visible state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    /// Node (or middleware) id.
    pub node_id: String,
    /// Current status.
    pub status: NodeRunStatus,
    /// Worker executing the current attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,
    /// Dispatch attempts made.
    pub attempt: u32,
    /// Effective parameters.
    pub parameters: Map<String, Value>,
    /// Result document, when succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    /// Error, when failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// When the node started running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the node finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl NodeView {
    fn from_state(node_id: &str, state: &NodeRunState) -> Self {
        Self {
            node_id: node_id.to_string(),
            status: state.status,
            worker_name: state.worker_name.as_ref().map(ToString::to_string),
            attempt: state.attempt,
            parameters: state.parameters.clone(),
            results: state.results.clone(),
            error: state.error.clone(),
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }
}

/// One run's externally visible state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunView {
    /// Run id.
    pub run_id: RunId,
    /// Caller-supplied client id.
    pub client_id: String,
    /// Run status.
    pub status: RunStatus,
    /// First surfaced failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the run finalised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Workflow name from the snapshot metadata.
    pub workflow_name: String,
    /// Per-node state, in snapshot order.
    pub nodes: Vec<NodeView>,
}

impl RunView {
    /// Project a run record into its API view.
    #[must_use]
    pub fn from_record(record: &RunRecord) -> Self {
        Self {
            run_id: record.run_id,
            client_id: record.client_id.clone(),
            status: record.status,
            error: record.error.clone(),
            created_at: record.created_at,
            finished_at: record.finished_at,
            workflow_name: record.workflow.metadata.name.clone(),
            nodes: record
                .nodes
                .iter()
                .map(|(id, state)| NodeView::from_state(id.as_str(), state))
                .collect(),
        }
    }
}

/// One worker's externally visible state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerView {
    /// Worker name.
    pub worker_name: String,
    /// Availability.
    pub status: WorkerStatus,
    /// Logical queue label.
    pub queue: String,
    /// Node types the worker executes.
    pub capabilities: Vec<String>,
    /// Installed packages, `name:version`.
    pub packages: Vec<String>,
    /// Tasks currently dispatched.
    pub in_flight_tasks: u32,
    /// Latency EWMA, milliseconds.
    pub observed_latency_ms: f64,
    /// First registration.
    pub registered_at: DateTime<Utc>,
    /// Last heartbeat.
    pub last_heartbeat_at: DateTime<Utc>,
}

impl WorkerView {
    /// Project a worker record into its API view.
    #[must_use]
    pub fn from_record(record: &WorkerRecord) -> Self {
        Self {
            worker_name: record.worker_name.to_string(),
            status: record.status,
            queue: record.queue.clone(),
            capabilities: record.capabilities.clone(),
            packages: record.packages.clone(),
            in_flight_tasks: record.in_flight_tasks,
            observed_latency_ms: record.observed_latency_ms_ewma,
            registered_at: record.registered_at,
            last_heartbeat_at: record.last_heartbeat_at,
        }
    }
}

/// `202 Accepted` body for `POST /runs`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    /// The accepted (or replayed) run id.
    pub run_id: String,
}

/// `202 Accepted` body for worker commands.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRef {
    /// Tracking id of the enqueued command.
    pub command_id: String,
    /// Always `accepted`.
    pub status: String,
}

/// Cursor-paginated listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Cursor for the next page, when more items exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::TenantId;
    use meridian_registry::StartRunRequest;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record() -> RunRecord {
        let request: StartRunRequest = serde_json::from_value(json!({
            "clientId": "c",
            "workflow": {
                "id": "wf",
                "schemaVersion": "2025-10",
                "metadata": {"name": "demo", "namespace": "default", "originId": "wf"},
                "nodes": [
                    {
                        "id": "a", "type": "example.pkg.source",
                        "package": {"name": "example.pkg", "version": "1.0.0"},
                        "status": "published", "category": "test", "label": "A"
                    }
                ],
                "edges": []
            }
        }))
        .unwrap();
        RunRecord::create(RunId::v4(), &request, TenantId::v4()).unwrap()
    }

    #[test]
    fn run_view_is_camel_case() {
        let view = RunView::from_record(&record());
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("runId").is_some());
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["workflowName"], "demo");
        assert_eq!(json["nodes"][0]["nodeId"], "a");
        assert_eq!(json["nodes"][0]["status"], "queued");
    }

    #[test]
    fn absent_optionals_omitted() {
        let view = RunView::from_record(&record());
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("finishedAt").is_none());
        assert!(json.get("error").is_none());
    }
}
