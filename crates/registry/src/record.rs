//! Per-run mutable state: the run record and its node states.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use meridian_core::{DispatchId, NodeKey, RunId, TaskId, TenantId, WorkerName};
use meridian_protocol::ErrorInfo;
use meridian_workflow::{
    DependencyGraph, NodeSpec, ScopeIndex, WorkflowSnapshot, validate_snapshot,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::binding::{BindingList, build_edge_bindings};
use crate::error::RegistryError;
use crate::status::{NodeRunStatus, RunStatus};
use crate::transition::{validate_node_transition, validate_run_transition};

/// The request that launches a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    /// Immutable workflow snapshot to execute.
    pub workflow: WorkflowSnapshot,
    /// Caller-supplied client identifier.
    pub client_id: String,
}

/// Mutable execution state of one node or middleware hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRunState {
    /// Current status.
    pub status: NodeRunStatus,
    /// Worker executing the current attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<WorkerName>,
    /// Task id of the current attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    /// Dispatch id of the current attempt (idempotency token).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_id: Option<DispatchId>,
    /// Dispatch attempts made so far.
    pub attempt: u32,
    /// Session seq the current dispatch was sent under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq_used: Option<u64>,
    /// Deadline by which the current dispatch must be acknowledged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_deadline: Option<DateTime<Utc>>,
    /// When the worker acknowledged the current dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acked_at: Option<DateTime<Utc>>,
    /// Earliest instant the node may be dispatched again (retry backoff).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    /// Effective parameters, seeded from the snapshot and mutated by edge
    /// bindings.
    pub parameters: Map<String, Value>,
    /// Result document reported by the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    /// Error reported by the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// When the first attempt started running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the node reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Middleware chain ids, in execution order. Hosts only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middleware_chain: Vec<NodeKey>,
    /// Index of the next middleware hop to execute. Hosts only.
    #[serde(default)]
    pub chain_cursor: usize,
}

impl NodeRunState {
    /// Seed a node state from its snapshot spec.
    #[must_use]
    pub fn from_spec(spec: &NodeSpec) -> Self {
        Self {
            status: NodeRunStatus::Queued,
            worker_name: None,
            task_id: None,
            dispatch_id: None,
            attempt: 0,
            seq_used: None,
            ack_deadline: None,
            acked_at: None,
            not_before: None,
            parameters: spec.parameters.clone(),
            results: None,
            error: None,
            started_at: None,
            finished_at: None,
            middleware_chain: spec.middlewares.iter().map(|m| m.id.clone()).collect(),
            chain_cursor: 0,
        }
    }

    /// Transition to a new status, validating and timestamping.
    pub fn transition_to(&mut self, new_status: NodeRunStatus) -> Result<(), RegistryError> {
        validate_node_transition(self.status, new_status)?;
        self.status = new_status;

        if new_status == NodeRunStatus::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if new_status.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Clear every dispatch-scoped field (reset to queued).
    pub fn clear_dispatch(&mut self) {
        self.worker_name = None;
        self.task_id = None;
        self.dispatch_id = None;
        self.seq_used = None;
        self.ack_deadline = None;
        self.acked_at = None;
    }

    /// Whether retry backoff permits dispatching at `now`.
    #[must_use]
    pub fn backoff_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.not_before.is_none_or(|t| now >= t)
    }
}

/// The complete mutable state of one run.
///
/// Containment is by owning collections; middleware states live beside host
/// states in `nodes`, cross-referenced by id.
#[derive(Debug, Clone)]
pub struct RunRecord {
    /// Run identifier.
    pub run_id: RunId,
    /// Tenant owning the run.
    pub tenant: TenantId,
    /// Caller-supplied client identifier.
    pub client_id: String,
    /// Run status; strictly forward.
    pub status: RunStatus,
    /// First surfaced failure, if any.
    pub error: Option<ErrorInfo>,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the run reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// The immutable snapshot this run executes.
    pub workflow: Arc<WorkflowSnapshot>,
    /// Node → scope, derived at creation.
    pub scope_index: ScopeIndex,
    /// Host-level dependency graph, derived at creation.
    pub graph: DependencyGraph,
    /// Source node → outgoing edge bindings, derived at creation.
    pub edge_bindings: HashMap<NodeKey, BindingList>,
    /// Per-node (and per-middleware) execution state, in snapshot order.
    pub nodes: IndexMap<NodeKey, NodeRunState>,
    host_of: HashMap<NodeKey, NodeKey>,
}

impl RunRecord {
    /// Validate the snapshot and build the run's initial state.
    pub fn create(
        run_id: RunId,
        request: &StartRunRequest,
        tenant: TenantId,
    ) -> Result<Self, RegistryError> {
        validate_snapshot(&request.workflow)?;

        let workflow = Arc::new(request.workflow.clone());
        let scope_index = ScopeIndex::from_snapshot(&workflow);
        let graph = DependencyGraph::from_snapshot(&workflow)?;
        let edge_bindings = build_edge_bindings(&workflow)?;

        let mut nodes = IndexMap::new();
        let mut host_of = HashMap::new();
        for spec in &workflow.nodes {
            nodes.insert(spec.id.clone(), NodeRunState::from_spec(spec));
            for mw in &spec.middlewares {
                nodes.insert(mw.id.clone(), NodeRunState::from_spec(mw));
                host_of.insert(mw.id.clone(), spec.id.clone());
            }
        }

        Ok(Self {
            run_id,
            tenant,
            client_id: request.client_id.clone(),
            status: RunStatus::Queued,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
            workflow,
            scope_index,
            graph,
            edge_bindings,
            nodes,
            host_of,
        })
    }

    /// State of a node or middleware.
    #[must_use]
    pub fn node(&self, id: &NodeKey) -> Option<&NodeRunState> {
        self.nodes.get(id)
    }

    /// Mutable state of a node or middleware.
    pub fn node_mut(&mut self, id: &NodeKey) -> Option<&mut NodeRunState> {
        self.nodes.get_mut(id)
    }

    /// The host a middleware belongs to; `None` for host nodes.
    #[must_use]
    pub fn host_of(&self, middleware: &NodeKey) -> Option<&NodeKey> {
        self.host_of.get(middleware)
    }

    /// Whether the id names a top-level host node (not a middleware).
    #[must_use]
    pub fn is_host(&self, id: &NodeKey) -> bool {
        !self.host_of.contains_key(id) && self.nodes.contains_key(id)
    }

    /// Find the node currently carrying the given task id.
    #[must_use]
    pub fn find_by_task(&self, task_id: TaskId) -> Option<&NodeKey> {
        self.nodes
            .iter()
            .find(|(_, state)| state.task_id == Some(task_id))
            .map(|(id, _)| id)
    }

    /// Transition the run status, validating and timestamping.
    pub fn transition_run(&mut self, new_status: RunStatus) -> Result<(), RegistryError> {
        validate_run_transition(self.status, new_status)?;
        self.status = new_status;
        if new_status.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Whether the run is in a final status.
    #[must_use]
    pub fn is_finalised(&self) -> bool {
        self.status.is_terminal()
    }

    /// Host nodes in snapshot order.
    pub fn hosts(&self) -> impl Iterator<Item = (&NodeKey, &NodeRunState)> {
        self.nodes
            .iter()
            .filter(|(id, _)| !self.host_of.contains_key(*id))
    }

    /// Whether every host node (and every middleware belonging to a host
    /// that reached a terminal state) is terminal.
    #[must_use]
    pub fn all_hosts_terminal(&self) -> bool {
        self.hosts().all(|(_, state)| state.status.is_terminal())
    }
}
