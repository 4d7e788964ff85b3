//! The run state service: the façade the HTTP layer drives.

use std::sync::Arc;

use meridian_core::{CommandId, RunId, TenantId, WorkerName};
use meridian_gateway::{WorkerRecord, WorkerStatus};
use meridian_protocol::{AdminCmdPayload, AdminCommand};
use meridian_registry::{RegistryError, RunRecord, RunStatus, StartRunRequest};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::DispatchError;
use crate::events::ControlEvent;
use crate::orchestrator::Orchestrator;

/// High-level operations over runs and workers.
#[derive(Debug, Clone)]
pub struct RunStateService {
    orchestrator: Arc<Orchestrator>,
}

impl RunStateService {
    /// Wrap an orchestrator.
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// The orchestrator behind this service.
    #[must_use]
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Create a run and kick off its first dispatch round asynchronously.
    ///
    /// Returns as soon as the run record exists; execution proceeds in the
    /// background.
    pub async fn start_run(
        &self,
        run_id: RunId,
        request: &StartRunRequest,
        tenant: TenantId,
    ) -> Result<RunRecord, RegistryError> {
        let record = self
            .orchestrator
            .registry()
            .create_run(run_id, request, tenant)
            .await?;
        info!(%run_id, client = %record.client_id, "run accepted");
        self.orchestrator.notify(ControlEvent::RunStatusChanged {
            run_id,
            status: RunStatus::Queued,
        });

        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            orchestrator.pump(run_id, tenant).await;
        });
        Ok(record)
    }

    /// Snapshot of one run.
    pub async fn get_run(&self, run_id: RunId) -> Result<RunRecord, RegistryError> {
        self.orchestrator.registry().get(run_id).await
    }

    /// Cursor-paginated run listing.
    pub async fn list_runs(
        &self,
        limit: usize,
        cursor: Option<RunId>,
        status: Option<RunStatus>,
        client_id: Option<&str>,
    ) -> (Vec<RunRecord>, Option<RunId>) {
        self.orchestrator
            .registry()
            .list(limit, cursor, status, client_id)
            .await
    }

    /// Cancel a run (idempotent) and notify its workers.
    pub async fn cancel_run(&self, run_id: RunId) -> Result<RunRecord, DispatchError> {
        let outcome = self.orchestrator.cancel_run(run_id).await?;
        Ok(outcome.record)
    }

    /// Every registered worker, sorted by name.
    #[must_use]
    pub fn list_workers(&self) -> Vec<WorkerRecord> {
        self.orchestrator.gateway().catalog().snapshot()
    }

    /// One worker's record.
    #[must_use]
    pub fn get_worker(&self, worker_name: &WorkerName) -> Option<WorkerRecord> {
        self.orchestrator.gateway().catalog().get(worker_name)
    }

    /// Enqueue an admin command on a worker's session.
    ///
    /// `drain` flips the worker to draining immediately so selection stops
    /// offering it new tasks; the worker confirms with an `admin_result`.
    pub async fn send_worker_command(
        &self,
        worker_name: &WorkerName,
        command_id: CommandId,
        command: AdminCommand,
        args: Map<String, Value>,
    ) -> Result<CommandId, DispatchError> {
        let payload = AdminCmdPayload {
            command_id,
            command,
            args,
        };
        self.orchestrator
            .gateway()
            .send_admin_command(worker_name, payload)
            .await?;

        if command == AdminCommand::Drain {
            self.orchestrator
                .gateway()
                .catalog()
                .set_status(worker_name, WorkerStatus::Draining);
            self.orchestrator.notify(ControlEvent::WorkerChanged {
                worker_name: worker_name.clone(),
            });
        }
        Ok(command_id)
    }
}
