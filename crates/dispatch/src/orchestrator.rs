//! The orchestrator: readiness → dispatch, gateway events → registry.

use std::sync::Arc;

use chrono::Utc;
use meridian_core::{DispatchId, RunId, TaskId, TenantId, WorkerName};
use meridian_gateway::{GatewayEvent, SessionManager};
use meridian_protocol::{
    CancelPayload, ErrorInfo, ResultPayload, TaskResultStatus, WorkerCancelReason,
};
use meridian_registry::{
    CancelOutcome, DispatchMark, NodeRunStatus, ReadyNode, ResultApplication, RunRegistry,
};
use meridian_storage::{AuditEvent, AuditSink};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::RetryBackoff;
use crate::error::DispatchError;
use crate::events::ControlEvent;
use crate::inflight::{InFlightTable, InFlightTask};
use crate::request::{build_dispatch, validate_chain};
use crate::selection::{SelectionRequirements, SelectionStrategy, select_worker};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Worker selection policy.
    pub strategy: SelectionStrategy,
    /// Heartbeats older than this exclude a worker from selection.
    pub max_heartbeat_age_seconds: u64,
    /// Time a worker has to acknowledge a dispatch.
    pub ack_timeout_seconds: u64,
    /// Grace a disconnected session gets before its tasks are rescheduled.
    pub disconnect_grace_seconds: u64,
    /// Retry backoff for reassignments and empty selection windows.
    pub retry: RetryBackoff,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::Default,
            max_heartbeat_age_seconds: 90,
            ack_timeout_seconds: 30,
            disconnect_grace_seconds: 60,
            retry: RetryBackoff::default(),
        }
    }
}

/// Bridges readiness signals and the worker gateway.
pub struct Orchestrator {
    registry: Arc<RunRegistry>,
    gateway: Arc<SessionManager>,
    inflight: InFlightTable,
    config: DispatchConfig,
    audit: Arc<dyn AuditSink>,
    events: mpsc::UnboundedSender<ControlEvent>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator; the receiver carries [`ControlEvent`]s for
    /// the API event hub.
    #[must_use]
    pub fn new(
        registry: Arc<RunRegistry>,
        gateway: Arc<SessionManager>,
        config: DispatchConfig,
        audit: Arc<dyn AuditSink>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ControlEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                registry,
                gateway,
                inflight: InFlightTable::new(),
                config,
                audit,
                events,
                shutdown: CancellationToken::new(),
            }),
            rx,
        )
    }

    /// The registry this orchestrator drives.
    #[must_use]
    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    /// The gateway this orchestrator dispatches through.
    #[must_use]
    pub fn gateway(&self) -> &Arc<SessionManager> {
        &self.gateway
    }

    /// Tasks currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Signal every background task to stop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Surface a control event to the API event hub.
    pub fn notify(&self, event: ControlEvent) {
        let _ = self.events.send(event);
    }

    /// The audit sink mutating operations record into.
    #[must_use]
    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    /// Collect a run's ready units and dispatch them.
    pub async fn pump(self: &Arc<Self>, run_id: RunId, tenant: TenantId) {
        let ready = match self.registry.collect_ready_nodes(run_id).await {
            Ok(ready) => ready,
            Err(err) => {
                warn!(%run_id, %err, "readiness collection failed");
                return;
            }
        };
        for unit in ready {
            let attempt = unit.attempt;
            match self.dispatch_unit(run_id, tenant, unit).await {
                Ok(()) => {}
                Err(DispatchError::NoWorkerAvailable(node)) => {
                    debug!(%run_id, %node, "no eligible worker, retrying after backoff");
                    self.schedule_pump(run_id, tenant, self.config.retry.delay(attempt));
                }
                Err(DispatchError::Gateway(err)) => {
                    // The node went back to queued; try again once the
                    // gateway settles.
                    debug!(%run_id, %err, "gateway refused the send, retrying after backoff");
                    self.schedule_pump(run_id, tenant, self.config.retry.delay(attempt));
                }
                Err(DispatchError::Registry(
                    meridian_registry::RegistryError::DispatchConflict(_),
                )) => {
                    // A concurrent pump won the race; nothing to do.
                }
                Err(err) => {
                    warn!(%run_id, %err, "dispatch failed");
                }
            }
        }
    }

    fn schedule_pump(self: &Arc<Self>, run_id: RunId, tenant: TenantId, delay: std::time::Duration) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = this.shutdown.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    this.pump(run_id, tenant).await;
                }
            }
        });
    }

    /// Dispatch one ready unit: select a worker, record the transition,
    /// send the frame.
    pub async fn dispatch_unit(
        &self,
        run_id: RunId,
        tenant: TenantId,
        unit: ReadyNode,
    ) -> Result<(), DispatchError> {
        let task_id = TaskId::v4();
        let dispatch_id = DispatchId::v4();
        let payload = build_dispatch(run_id, tenant, &unit, task_id, dispatch_id);
        validate_chain(&payload).map_err(DispatchError::InvalidChain)?;

        let requirements = SelectionRequirements {
            node_type: unit.node_type.clone(),
            package: format!("{}:{}", unit.package_name, unit.package_version),
            affinity: payload.affinity.clone(),
            max_heartbeat_age: chrono::Duration::seconds(
                self.config.max_heartbeat_age_seconds as i64,
            ),
        };
        let records = self.gateway.catalog().snapshot();
        let worker_name = select_worker(&records, &requirements, self.config.strategy, Utc::now())
            .ok_or_else(|| DispatchError::NoWorkerAvailable(unit.node_id.clone()))?;

        // Mark first so a fast worker's result always finds the task bound.
        let ack_deadline =
            Utc::now() + chrono::Duration::seconds(self.config.ack_timeout_seconds as i64);
        self.registry
            .mark_dispatched(
                run_id,
                &DispatchMark {
                    node_id: unit.node_id.clone(),
                    task_id,
                    worker_name: worker_name.clone(),
                    dispatch_id,
                    seq_used: 0,
                    ack_deadline,
                },
            )
            .await?;

        match self.gateway.send_dispatch(&worker_name, payload).await {
            Ok(seq) => {
                let _ = self
                    .registry
                    .note_seq_used(run_id, &unit.node_id, dispatch_id, seq)
                    .await;
            }
            Err(err) => {
                // The node goes back to queued; selection will avoid the
                // dead session on the next pass.
                warn!(%run_id, node = %unit.node_id, %err, "send failed, requeueing");
                let _ = self
                    .registry
                    .reset_after_worker_cancel(run_id, &unit.node_id, task_id)
                    .await;
                return Err(err.into());
            }
        }

        self.inflight.insert(
            task_id,
            InFlightTask {
                run_id,
                node_id: unit.node_id.clone(),
                worker_name: worker_name.clone(),
                dispatch_id,
                dispatched_at: Utc::now(),
                ack_deadline,
                acked: false,
            },
        );
        self.gateway.catalog().adjust_in_flight(&worker_name, 1);
        let _ = self.events.send(ControlEvent::NodeStatusChanged {
            run_id,
            node_id: unit.node_id,
            status: NodeRunStatus::Running,
        });
        Ok(())
    }

    /// Handle one gateway event.
    pub async fn handle_event(self: &Arc<Self>, event: GatewayEvent) {
        match event {
            GatewayEvent::WorkerConnected { worker_name }
            | GatewayEvent::WorkerResumed { worker_name, .. }
            | GatewayEvent::WorkerDisconnected { worker_name, .. } => {
                let _ = self
                    .events
                    .send(ControlEvent::WorkerChanged { worker_name });
            }
            GatewayEvent::SessionExpired { worker_name, .. } => {
                let _ = self.events.send(ControlEvent::WorkerChanged {
                    worker_name: worker_name.clone(),
                });
                self.reassign_worker_tasks(&worker_name).await;
            }
            GatewayEvent::DispatchAcked { payload, .. } => {
                self.inflight.mark_acked(payload.task_id);
                let _ = self
                    .registry
                    .record_ack(payload.run_id, payload.task_id, payload.dispatch_id)
                    .await;
            }
            GatewayEvent::TaskResult {
                worker_name,
                payload,
            } => {
                self.handle_result(&worker_name, payload).await;
            }
            GatewayEvent::TaskProgress { .. } => {
                // Per-node progress is not persisted by the control plane.
            }
            GatewayEvent::WorkerCancelled {
                worker_name,
                payload,
            } => {
                self.handle_worker_cancel(&worker_name, payload).await;
            }
            GatewayEvent::AdminResult {
                worker_name,
                payload,
            } => {
                self.audit.record(AuditEvent::new(
                    None,
                    "worker.command_result",
                    "worker",
                    Some(worker_name.to_string()),
                    meridian_storage::details_json(&payload),
                ));
                let _ = self
                    .events
                    .send(ControlEvent::WorkerChanged { worker_name });
            }
        }
    }

    async fn handle_result(self: &Arc<Self>, worker_name: &WorkerName, payload: ResultPayload) {
        if self.inflight.remove(payload.task_id).is_some() {
            self.gateway.catalog().adjust_in_flight(worker_name, -1);
        }
        if let Some(ms) = payload.duration_ms {
            self.gateway
                .catalog()
                .observe_latency(worker_name, ms as f64);
        }

        let run_id = payload.run_id;
        match self.registry.record_result(run_id, &payload).await {
            Ok(ResultApplication::Applied {
                node_id,
                newly_ready,
                run_status,
            }) => {
                let node_status = match payload.status {
                    TaskResultStatus::Succeeded => NodeRunStatus::Succeeded,
                    TaskResultStatus::Failed => NodeRunStatus::Failed,
                    TaskResultStatus::Skipped => NodeRunStatus::Skipped,
                    TaskResultStatus::Cancelled => NodeRunStatus::Cancelled,
                };
                let _ = self.events.send(ControlEvent::NodeStatusChanged {
                    run_id,
                    node_id,
                    status: node_status,
                });

                if run_status.is_terminal() {
                    info!(%run_id, status = %run_status, "run reached terminal status");
                    let _ = self.events.send(ControlEvent::RunStatusChanged {
                        run_id,
                        status: run_status,
                    });
                    return;
                }
                if !newly_ready.is_empty() {
                    let tenant = match self.registry.get(run_id).await {
                        Ok(record) => record.tenant,
                        Err(_) => return,
                    };
                    for unit in newly_ready {
                        let attempt = unit.attempt;
                        if let Err(
                            DispatchError::NoWorkerAvailable(_) | DispatchError::Gateway(_),
                        ) = self.dispatch_unit(run_id, tenant, unit).await
                        {
                            self.schedule_pump(run_id, tenant, self.config.retry.delay(attempt));
                        }
                    }
                }
            }
            Ok(ResultApplication::Finalised | ResultApplication::Stale) => {}
            Err(err) => warn!(%run_id, %err, "result application failed"),
        }
    }

    async fn handle_worker_cancel(
        self: &Arc<Self>,
        worker_name: &WorkerName,
        payload: meridian_protocol::WorkerCancelPayload,
    ) {
        let Some(task) = self.inflight.remove(payload.task_id) else {
            debug!(task = %payload.task_id, "worker cancel for unknown task");
            return;
        };
        self.gateway.catalog().adjust_in_flight(worker_name, -1);

        match payload.reason {
            WorkerCancelReason::Permanent => {
                // The node fails; the normal result path applies it.
                let synthesized = ResultPayload {
                    run_id: task.run_id,
                    task_id: payload.task_id,
                    status: TaskResultStatus::Failed,
                    result: None,
                    error: Some(ErrorInfo {
                        code: "worker_cancelled_permanent".into(),
                        message: payload
                            .message
                            .unwrap_or_else(|| "worker rejected the task".into()),
                        details: None,
                    }),
                    metadata: None,
                    duration_ms: None,
                };
                self.handle_result(worker_name, synthesized).await;
            }
            WorkerCancelReason::Transient => {
                self.requeue_task(payload.task_id, task, "worker_cancel_transient")
                    .await;
            }
        }
    }

    /// Give a task back to the ready set (or fail it once attempts are
    /// exhausted) and re-pump the run after backoff.
    async fn requeue_task(self: &Arc<Self>, task_id: TaskId, task: InFlightTask, cause: &str) {
        let run_id = task.run_id;
        let attempt = match self.registry.get(run_id).await {
            Ok(record) => record.node(&task.node_id).map_or(0, |n| n.attempt),
            Err(_) => return,
        };

        if !self.config.retry.attempts_left(attempt + 1) {
            warn!(%run_id, node = %task.node_id, attempt, "dispatch attempts exhausted");
            let synthesized = ResultPayload {
                run_id,
                task_id,
                status: TaskResultStatus::Failed,
                result: None,
                error: Some(ErrorInfo {
                    code: "dispatch_timeout".into(),
                    message: format!("dispatch attempts exhausted after {cause}"),
                    details: None,
                }),
                metadata: None,
                duration_ms: None,
            };
            let worker = task.worker_name.clone();
            self.handle_result(&worker, synthesized).await;
            return;
        }

        match self
            .registry
            .reset_after_worker_cancel(run_id, &task.node_id, task_id)
            .await
        {
            Ok(record) => {
                self.audit.record(AuditEvent::new(
                    None,
                    "dispatch.reassigned",
                    "run",
                    Some(run_id.to_string()),
                    serde_json::json!({
                        "node_id": task.node_id.to_string(),
                        "from_worker": task.worker_name.to_string(),
                        "cause": cause,
                    }),
                ));
                let _ = self.events.send(ControlEvent::DispatchReassigned {
                    run_id,
                    node_id: task.node_id.clone(),
                    from_worker: task.worker_name.clone(),
                });
                let _ = self.events.send(ControlEvent::NodeStatusChanged {
                    run_id,
                    node_id: task.node_id.clone(),
                    status: NodeRunStatus::Queued,
                });
                self.schedule_pump(run_id, record.tenant, self.config.retry.delay(attempt));
            }
            Err(err) => debug!(%run_id, %err, "requeue skipped"),
        }
    }

    /// Reschedule every in-flight task of a worker whose session expired.
    async fn reassign_worker_tasks(self: &Arc<Self>, worker_name: &WorkerName) {
        for (task_id, task) in self.inflight.take_for_worker(worker_name) {
            self.requeue_task(task_id, task, "session_expired").await;
        }
    }

    /// Requeue unacked dispatches whose ack deadline passed.
    pub async fn sweep_ack_deadlines(self: &Arc<Self>) {
        for (task_id, task) in self.inflight.take_overdue(Utc::now()) {
            self.gateway
                .catalog()
                .adjust_in_flight(&task.worker_name, -1);
            self.requeue_task(task_id, task, "ack_timeout").await;
        }
    }

    /// Cancel a run: finalise the registry and send best-effort cancels to
    /// every worker still holding one of its tasks.
    pub async fn cancel_run(
        self: &Arc<Self>,
        run_id: RunId,
    ) -> Result<CancelOutcome, DispatchError> {
        let outcome = self.registry.request_cancel(run_id).await?;
        for (worker_name, task_id) in &outcome.running_tasks {
            self.inflight.remove(*task_id);
            self.gateway.catalog().adjust_in_flight(worker_name, -1);
            let cancel = CancelPayload {
                run_id,
                task_id: *task_id,
                reason: Some("run cancelled".into()),
            };
            if let Err(err) = self.gateway.send_cancel(worker_name, cancel).await {
                debug!(%run_id, worker = %worker_name, %err, "cancel delivery failed");
            }
        }
        let _ = self.events.send(ControlEvent::RunStatusChanged {
            run_id,
            status: outcome.record.status,
        });
        Ok(outcome)
    }

    /// Consume gateway events until shutdown.
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<GatewayEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = this.shutdown.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => this.handle_event(event).await,
                        None => break,
                    },
                }
            }
        })
    }

    /// Periodic sweeps: ack deadlines, session grace, heartbeat staleness.
    pub fn spawn_maintenance(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
            loop {
                tokio::select! {
                    () = this.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        this.sweep_ack_deadlines().await;
                        let now = Utc::now();
                        this.gateway.sweep_expired(
                            now,
                            chrono::Duration::seconds(this.config.disconnect_grace_seconds as i64),
                        );
                        let stale = this.gateway.catalog().sweep_stale(
                            now,
                            chrono::Duration::seconds(
                                (this.gateway.config().heartbeat_interval_seconds * 3) as i64,
                            ),
                        );
                        for worker_name in stale {
                            let _ = this.events.send(ControlEvent::WorkerChanged { worker_name });
                        }
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("in_flight", &self.inflight.len())
            .finish_non_exhaustive()
    }
}
