//! In-flight dispatch accounting and ack deadlines.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use meridian_core::{DispatchId, NodeKey, RunId, TaskId, WorkerName};

/// One dispatched task awaiting its terminal result.
#[derive(Debug, Clone)]
pub struct InFlightTask {
    /// Run the task belongs to.
    pub run_id: RunId,
    /// The dispatched node (or middleware hop).
    pub node_id: NodeKey,
    /// The worker executing it.
    pub worker_name: WorkerName,
    /// Dispatch idempotency token.
    pub dispatch_id: DispatchId,
    /// When the dispatch was sent.
    pub dispatched_at: DateTime<Utc>,
    /// Deadline for the worker's dispatch ack.
    pub ack_deadline: DateTime<Utc>,
    /// Whether the worker has acknowledged.
    pub acked: bool,
}

/// Task id → in-flight record.
#[derive(Debug, Default)]
pub struct InFlightTable {
    tasks: DashMap<TaskId, InFlightTask>,
}

impl InFlightTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a dispatched task.
    pub fn insert(&self, task_id: TaskId, task: InFlightTask) {
        self.tasks.insert(task_id, task);
    }

    /// Mark a task acknowledged. Returns `false` for unknown tasks.
    pub fn mark_acked(&self, task_id: TaskId) -> bool {
        match self.tasks.get_mut(&task_id) {
            Some(mut task) => {
                task.acked = true;
                true
            }
            None => false,
        }
    }

    /// Stop tracking a task (result arrived or task reset).
    pub fn remove(&self, task_id: TaskId) -> Option<InFlightTask> {
        self.tasks.remove(&task_id).map(|(_, task)| task)
    }

    /// Look up a task.
    #[must_use]
    pub fn get(&self, task_id: TaskId) -> Option<InFlightTask> {
        self.tasks.get(&task_id).map(|entry| entry.value().clone())
    }

    /// Unacked tasks whose ack deadline has passed. The entries are removed
    /// from the table; the caller requeues them.
    pub fn take_overdue(&self, now: DateTime<Utc>) -> Vec<(TaskId, InFlightTask)> {
        let overdue: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|entry| !entry.acked && now > entry.ack_deadline)
            .map(|entry| *entry.key())
            .collect();
        overdue
            .into_iter()
            .filter_map(|task_id| self.tasks.remove(&task_id))
            .collect()
    }

    /// All tasks currently held by a worker. The entries are removed; the
    /// caller requeues them (used when a session expires).
    pub fn take_for_worker(&self, worker_name: &WorkerName) -> Vec<(TaskId, InFlightTask)> {
        let held: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|entry| &entry.worker_name == worker_name)
            .map(|entry| *entry.key())
            .collect();
        held.into_iter()
            .filter_map(|task_id| self.tasks.remove(&task_id))
            .collect()
    }

    /// Number of tracked tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
