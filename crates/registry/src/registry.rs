//! The run registry: the async operation surface over run records.
//!
//! Each run's record sits behind its own async mutex; result application is
//! serialised per run and parallel across runs. The registry never dispatches
//! anything itself — it reports readiness and applies transitions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use meridian_core::{DispatchId, NodeKey, RunId, TaskId, TenantId, WorkerName};
use meridian_protocol::{ErrorInfo, ResultPayload, TaskResultStatus};
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::ready::{ReadyNode, collect_ready};
use crate::record::{RunRecord, StartRunRequest};
use crate::status::{NodeRunStatus, RunStatus};

/// Outcome of applying one worker result.
#[derive(Debug, Clone)]
pub enum ResultApplication {
    /// The result was applied.
    Applied {
        /// The node (or middleware) the result resolved to.
        node_id: NodeKey,
        /// Units that became dispatchable because of this result.
        newly_ready: Vec<ReadyNode>,
        /// Run status after application.
        run_status: RunStatus,
    },
    /// The run is already finalised; nothing was mutated.
    Finalised,
    /// No node carries the task id (late result after a reset); dropped.
    Stale,
}

/// Outcome of a cancel request.
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    /// Snapshot of the record after cancellation.
    pub record: RunRecord,
    /// In-flight tasks that should receive best-effort cancel commands.
    pub running_tasks: Vec<(WorkerName, TaskId)>,
}

/// Fields recorded when a dispatch is sent.
#[derive(Debug, Clone)]
pub struct DispatchMark {
    /// The node (or middleware hop) that was dispatched.
    pub node_id: NodeKey,
    /// Task id of this attempt.
    pub task_id: TaskId,
    /// Chosen worker.
    pub worker_name: WorkerName,
    /// Dispatch idempotency token.
    pub dispatch_id: DispatchId,
    /// Session seq the dispatch was sent under.
    pub seq_used: u64,
    /// Acknowledgement deadline.
    pub ack_deadline: DateTime<Utc>,
}

/// Owner of all mutable run state.
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: DashMap<RunId, Arc<tokio::sync::Mutex<RunRecord>>>,
}

impl RunRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the snapshot and create a run.
    ///
    /// Returns a snapshot of the freshly created record.
    pub async fn create_run(
        &self,
        run_id: RunId,
        request: &StartRunRequest,
        tenant: TenantId,
    ) -> Result<RunRecord, RegistryError> {
        if self.runs.contains_key(&run_id) {
            return Err(RegistryError::RunExists(run_id));
        }
        let record = RunRecord::create(run_id, request, tenant)?;
        let snapshot = record.clone();
        self.runs
            .insert(run_id, Arc::new(tokio::sync::Mutex::new(record)));
        info!(%run_id, workflow = %snapshot.workflow.id, "run created");
        Ok(snapshot)
    }

    /// Snapshot of a run record.
    pub async fn get(&self, run_id: RunId) -> Result<RunRecord, RegistryError> {
        let entry = self.entry(run_id)?;
        let record = entry.lock().await;
        Ok(record.clone())
    }

    /// Cursor-paginated run listing, newest first.
    pub async fn list(
        &self,
        limit: usize,
        cursor: Option<RunId>,
        status: Option<RunStatus>,
        client_id: Option<&str>,
    ) -> (Vec<RunRecord>, Option<RunId>) {
        // Collect the handles first; a dashmap shard guard must not be
        // held across an await point.
        let entries: Vec<Arc<tokio::sync::Mutex<RunRecord>>> = self
            .runs
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut records = Vec::new();
        for entry in entries {
            let record = entry.lock().await;
            if let Some(wanted) = status {
                if record.status != wanted {
                    continue;
                }
            }
            if let Some(client) = client_id {
                if record.client_id != client {
                    continue;
                }
            }
            records.push(record.clone());
        }
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });

        let start = match cursor {
            Some(cursor_id) => records
                .iter()
                .position(|r| r.run_id == cursor_id)
                .map_or(0, |i| i + 1),
            None => 0,
        };
        let page: Vec<RunRecord> = records.into_iter().skip(start).take(limit).collect();
        let next = (page.len() == limit).then(|| page.last().map(|r| r.run_id)).flatten();
        (page, next)
    }

    /// Units of a run that are currently dispatchable.
    pub async fn collect_ready_nodes(&self, run_id: RunId) -> Result<Vec<ReadyNode>, RegistryError> {
        let entry = self.entry(run_id)?;
        let record = entry.lock().await;
        Ok(collect_ready(&record, Utc::now()))
    }

    /// Record that a unit was dispatched. Idempotent on `dispatch_id`.
    pub async fn mark_dispatched(
        &self,
        run_id: RunId,
        mark: &DispatchMark,
    ) -> Result<RunRecord, RegistryError> {
        let entry = self.entry(run_id)?;
        let mut record = entry.lock().await;

        if record.is_finalised() {
            return Err(RegistryError::Finalised(run_id));
        }

        let state = record
            .node(&mark.node_id)
            .ok_or_else(|| RegistryError::NodeNotFound(mark.node_id.clone()))?;

        // Replay of the same dispatch: no state drift.
        if state.dispatch_id == Some(mark.dispatch_id) {
            return Ok(record.clone());
        }
        if state.status == NodeRunStatus::Running {
            return Err(RegistryError::DispatchConflict(mark.node_id.clone()));
        }

        let state = record
            .node_mut(&mark.node_id)
            .ok_or_else(|| RegistryError::NodeNotFound(mark.node_id.clone()))?;
        state.transition_to(NodeRunStatus::Running)?;
        state.worker_name = Some(mark.worker_name.clone());
        state.task_id = Some(mark.task_id);
        state.dispatch_id = Some(mark.dispatch_id);
        state.seq_used = Some(mark.seq_used);
        state.ack_deadline = Some(mark.ack_deadline);
        state.acked_at = None;
        state.not_before = None;

        if record.status == RunStatus::Queued {
            record.transition_run(RunStatus::Running)?;
        }
        debug!(%run_id, node = %mark.node_id, worker = %mark.worker_name, "dispatch recorded");
        Ok(record.clone())
    }

    /// Record the session seq a dispatch actually went out under.
    ///
    /// The seq is assigned by the session at send time, after the node was
    /// already marked dispatched; a mismatched dispatch id is a no-op.
    pub async fn note_seq_used(
        &self,
        run_id: RunId,
        node_id: &NodeKey,
        dispatch_id: DispatchId,
        seq: u64,
    ) -> Result<(), RegistryError> {
        let entry = self.entry(run_id)?;
        let mut record = entry.lock().await;
        if let Some(state) = record.node_mut(node_id) {
            if state.dispatch_id == Some(dispatch_id) {
                state.seq_used = Some(seq);
            }
        }
        Ok(())
    }

    /// Record a worker's dispatch acknowledgement.
    pub async fn record_ack(
        &self,
        run_id: RunId,
        task_id: TaskId,
        dispatch_id: DispatchId,
    ) -> Result<(), RegistryError> {
        let entry = self.entry(run_id)?;
        let mut record = entry.lock().await;
        let Some(node_id) = record.find_by_task(task_id).cloned() else {
            return Err(RegistryError::TaskNotFound(task_id));
        };
        let state = record
            .node_mut(&node_id)
            .ok_or(RegistryError::NodeNotFound(node_id))?;
        if state.dispatch_id == Some(dispatch_id) && state.acked_at.is_none() {
            state.acked_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Apply a worker-reported terminal result.
    ///
    /// On success, writes the result into the node, applies edge bindings,
    /// advances middleware chains, and reports newly ready units. Calls on a
    /// finalised run are idempotent no-ops returning
    /// [`ResultApplication::Finalised`].
    pub async fn record_result(
        &self,
        run_id: RunId,
        payload: &ResultPayload,
    ) -> Result<ResultApplication, RegistryError> {
        let entry = self.entry(run_id)?;
        let mut record = entry.lock().await;

        if record.is_finalised() {
            return Ok(ResultApplication::Finalised);
        }
        let Some(node_id) = record.find_by_task(payload.task_id).cloned() else {
            warn!(%run_id, task = %payload.task_id, "result for unknown task dropped");
            return Ok(ResultApplication::Stale);
        };

        match payload.status {
            TaskResultStatus::Succeeded => {
                Self::apply_success(&mut record, &node_id, payload);
            }
            TaskResultStatus::Failed => {
                Self::apply_failure(&mut record, &node_id, payload.error.clone());
            }
            TaskResultStatus::Skipped => {
                Self::apply_terminal(&mut record, &node_id, NodeRunStatus::Skipped);
            }
            TaskResultStatus::Cancelled => {
                Self::apply_terminal(&mut record, &node_id, NodeRunStatus::Cancelled);
            }
        }

        Self::finalise_if_complete(&mut record);
        let newly_ready = collect_ready(&record, Utc::now());
        Ok(ResultApplication::Applied {
            node_id,
            newly_ready,
            run_status: record.status,
        })
    }

    /// Reset a running node back to queued after a transient worker cancel
    /// (or a missed ack deadline), so it re-enters the ready set.
    pub async fn reset_after_worker_cancel(
        &self,
        run_id: RunId,
        node_id: &NodeKey,
        task_id: TaskId,
    ) -> Result<RunRecord, RegistryError> {
        let entry = self.entry(run_id)?;
        let mut record = entry.lock().await;

        if record.is_finalised() {
            return Err(RegistryError::Finalised(run_id));
        }
        let state = record
            .node_mut(node_id)
            .ok_or_else(|| RegistryError::NodeNotFound(node_id.clone()))?;
        if state.task_id != Some(task_id) {
            return Err(RegistryError::TaskNotFound(task_id));
        }
        state.transition_to(NodeRunStatus::Queued)?;
        state.clear_dispatch();
        state.attempt += 1;
        info!(%run_id, node = %node_id, attempt = state.attempt, "node reset for retry");
        Ok(record.clone())
    }

    /// Cancel a run: mark it cancelled, cancel queued nodes, and report the
    /// in-flight tasks that should receive best-effort cancel commands.
    /// Idempotent on finalised runs.
    pub async fn request_cancel(&self, run_id: RunId) -> Result<CancelOutcome, RegistryError> {
        let entry = self.entry(run_id)?;
        let mut record = entry.lock().await;

        if record.is_finalised() {
            return Ok(CancelOutcome {
                record: record.clone(),
                running_tasks: Vec::new(),
            });
        }

        let mut running_tasks = Vec::new();
        let keys: Vec<NodeKey> = record.nodes.keys().cloned().collect();
        for key in keys {
            let state = record.node_mut(&key).expect("key from iteration");
            match state.status {
                NodeRunStatus::Queued => {
                    state.transition_to(NodeRunStatus::Cancelled)?;
                }
                NodeRunStatus::Running => {
                    if let (Some(worker), Some(task)) = (state.worker_name.clone(), state.task_id)
                    {
                        running_tasks.push((worker, task));
                    }
                }
                _ => {}
            }
        }
        record.transition_run(RunStatus::Cancelled)?;
        info!(%run_id, in_flight = running_tasks.len(), "run cancelled");
        Ok(CancelOutcome {
            record: record.clone(),
            running_tasks,
        })
    }

    fn entry(
        &self,
        run_id: RunId,
    ) -> Result<Arc<tokio::sync::Mutex<RunRecord>>, RegistryError> {
        self.runs
            .get(&run_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(RegistryError::RunNotFound(run_id))
    }

    fn apply_success(record: &mut RunRecord, node_id: &NodeKey, payload: &ResultPayload) {
        let state = record.node_mut(node_id).expect("resolved above");
        if state.transition_to(NodeRunStatus::Succeeded).is_err() {
            return;
        }
        state.results = Some(payload.result.clone().unwrap_or(serde_json::Value::Null));

        if let Some(host_id) = record.host_of(node_id).cloned() {
            // Middleware hop completed: the next hop becomes eligible.
            if let Some(host) = record.node_mut(&host_id) {
                host.chain_cursor += 1;
            }
        }
        Self::apply_bindings(record, node_id);
    }

    /// Apply every outgoing edge binding of a completed source node.
    fn apply_bindings(record: &mut RunRecord, source: &NodeKey) {
        let Some(bindings) = record.edge_bindings.get(source).cloned() else {
            return;
        };
        let Some(results) = record.node(source).and_then(|s| s.results.clone()) else {
            return;
        };
        for binding in bindings {
            let Some(value) = binding.source_path.resolve(&results).cloned() else {
                // Absent source path: the dependent keeps waiting.
                continue;
            };
            let Some(target) = record.node_mut(&binding.target_node) else {
                continue;
            };
            let mut doc = serde_json::Value::Object(std::mem::take(&mut target.parameters));
            binding.target_path.write(&mut doc, value);
            if let serde_json::Value::Object(map) = doc {
                target.parameters = map;
            }
        }
    }

    fn apply_failure(record: &mut RunRecord, node_id: &NodeKey, error: Option<ErrorInfo>) {
        // Container retry: a failed container node with attempts left goes
        // back to queued with backoff instead of failing the run.
        let retry = record
            .workflow
            .node(node_id.as_str())
            .and_then(|spec| spec.container.as_ref())
            .and_then(|container| container.retry_policy.clone());
        if let Some(retry) = retry {
            let max_attempts = retry.max_attempts.unwrap_or(1);
            let state = record.node_mut(node_id).expect("resolved above");
            if state.attempt + 1 < max_attempts {
                let backoff = retry.backoff_seconds.unwrap_or(0);
                let _ = state.transition_to(NodeRunStatus::Failed);
                let _ = state.transition_to(NodeRunStatus::Queued);
                state.clear_dispatch();
                state.finished_at = None;
                state.attempt += 1;
                state.not_before = Some(Utc::now() + chrono::Duration::seconds(backoff as i64));
                debug!(node = %node_id, attempt = state.attempt, "container retry scheduled");
                return;
            }
        }

        let state = record.node_mut(node_id).expect("resolved above");
        if state.transition_to(NodeRunStatus::Failed).is_err() {
            return;
        }
        state.error = error.clone();

        // A failed middleware hop fails its host: the host never runs.
        let failed_host = match record.host_of(node_id).cloned() {
            Some(host_id) => {
                if let Some(host) = record.node_mut(&host_id) {
                    let _ = host.transition_to(NodeRunStatus::Failed);
                    host.error = error.clone();
                }
                host_id
            }
            None => node_id.clone(),
        };

        if record.error.is_none() {
            record.error = error.or_else(|| {
                Some(ErrorInfo {
                    code: "node_failed".into(),
                    message: format!("node {failed_host} failed"),
                    details: None,
                })
            });
        }
        Self::skip_downstream(record, &failed_host);
    }

    fn apply_terminal(record: &mut RunRecord, node_id: &NodeKey, status: NodeRunStatus) {
        let host_id = record.host_of(node_id).cloned();
        let state = record.node_mut(node_id).expect("resolved above");
        if state.transition_to(status).is_err() {
            return;
        }
        // A hop that did not succeed ends its host's chain the same way.
        let affected = match host_id {
            Some(host_id) => {
                if let Some(host) = record.node_mut(&host_id) {
                    let _ = host.transition_to(status);
                }
                host_id
            }
            None => node_id.clone(),
        };
        Self::skip_downstream(record, &affected);
    }

    /// Mark every non-terminal transitive dependent of `node_id` skipped,
    /// along with pending middlewares of affected hosts.
    fn skip_downstream(record: &mut RunRecord, node_id: &NodeKey) {
        let dependents = record.graph.transitive_dependents(node_id);
        for dependent in dependents {
            let chain: Vec<NodeKey> = record
                .node(&dependent)
                .map(|s| s.middleware_chain.clone())
                .unwrap_or_default();
            if let Some(state) = record.node_mut(&dependent) {
                if state.status == NodeRunStatus::Queued {
                    let _ = state.transition_to(NodeRunStatus::Skipped);
                }
            }
            for hop in chain {
                if let Some(state) = record.node_mut(&hop) {
                    if state.status == NodeRunStatus::Queued {
                        let _ = state.transition_to(NodeRunStatus::Skipped);
                    }
                }
            }
        }
        // The failed node's own pending middlewares are dead too.
        let chain: Vec<NodeKey> = record
            .node(node_id)
            .map(|s| s.middleware_chain.clone())
            .unwrap_or_default();
        for hop in chain {
            if let Some(state) = record.node_mut(&hop) {
                if state.status == NodeRunStatus::Queued {
                    let _ = state.transition_to(NodeRunStatus::Skipped);
                }
            }
        }
    }

    /// Transition the run to a terminal status once every host is terminal.
    fn finalise_if_complete(record: &mut RunRecord) {
        if record.is_finalised() || !record.all_hosts_terminal() {
            return;
        }

        let failed = record.hosts().any(|(id, state)| {
            matches!(state.status, NodeRunStatus::Failed | NodeRunStatus::Cancelled)
                && !record
                    .workflow
                    .node(id.as_str())
                    .is_some_and(|spec| spec.optional)
        });
        let sinks = record.graph.exit_nodes();
        let any_sink_succeeded = sinks.iter().any(|sink| {
            record
                .node(sink)
                .is_some_and(|s| s.status == NodeRunStatus::Succeeded)
        });

        let terminal = if !failed && any_sink_succeeded {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        if record.transition_run(terminal).is_ok() {
            info!(run = %record.run_id, status = %terminal, "run finalised");
        }
    }
}
