//! The worker catalogue.
//!
//! One record per registered worker; reads are hot (selection on every
//! dispatch), writes are rare (register, heartbeat, state transitions), so
//! the catalogue sits behind a single reader-writer lock.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use meridian_core::{SessionId, WorkerName};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Worker availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Connected and accepting dispatches.
    Online,
    /// Finishing current tasks, accepting nothing new.
    Draining,
    /// Disconnected or heartbeat-stale.
    Offline,
}

/// One registered worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Unique worker name.
    pub worker_name: WorkerName,
    /// When the worker first registered.
    pub registered_at: DateTime<Utc>,
    /// Last heartbeat (or any inbound frame).
    pub last_heartbeat_at: DateTime<Utc>,
    /// Node types this worker can execute.
    pub capabilities: Vec<String>,
    /// Installed packages, `name:version`.
    pub packages: Vec<String>,
    /// Logical queue label.
    pub queue: String,
    /// Tasks currently dispatched to this worker.
    pub in_flight_tasks: u32,
    /// Exponentially weighted moving average of observed latency.
    pub observed_latency_ms_ewma: f64,
    /// Availability.
    pub status: WorkerStatus,
    /// Bound control-plane session, when connected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl WorkerRecord {
    /// Heartbeat freshness check; the boundary instant is still eligible.
    #[must_use]
    pub fn heartbeat_fresh(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.last_heartbeat_at <= max_age
    }
}

/// Name → record catalogue behind a reader-writer lock.
#[derive(Debug, Default)]
pub struct WorkerCatalog {
    workers: RwLock<HashMap<WorkerName, WorkerRecord>>,
}

/// EWMA smoothing factor for observed latency.
const LATENCY_ALPHA: f64 = 0.2;

impl WorkerCatalog {
    /// Create an empty catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) a worker coming online.
    pub fn register(
        &self,
        worker_name: WorkerName,
        capabilities: Vec<String>,
        packages: Vec<String>,
        queue: String,
        session_id: SessionId,
    ) {
        let now = Utc::now();
        let mut workers = self.workers.write();
        workers
            .entry(worker_name.clone())
            .and_modify(|record| {
                record.capabilities = capabilities.clone();
                record.packages = packages.clone();
                record.queue = queue.clone();
                record.status = WorkerStatus::Online;
                record.session_id = Some(session_id);
                record.last_heartbeat_at = now;
            })
            .or_insert_with(|| WorkerRecord {
                worker_name,
                registered_at: now,
                last_heartbeat_at: now,
                capabilities,
                packages,
                queue,
                in_flight_tasks: 0,
                observed_latency_ms_ewma: 0.0,
                status: WorkerStatus::Online,
                session_id: Some(session_id),
            });
    }

    /// Record a heartbeat.
    pub fn heartbeat(&self, worker_name: &WorkerName) {
        if let Some(record) = self.workers.write().get_mut(worker_name) {
            record.last_heartbeat_at = Utc::now();
            if record.status == WorkerStatus::Offline {
                record.status = WorkerStatus::Online;
            }
        }
    }

    /// Set a worker's availability.
    pub fn set_status(&self, worker_name: &WorkerName, status: WorkerStatus) {
        if let Some(record) = self.workers.write().get_mut(worker_name) {
            record.status = status;
            if status == WorkerStatus::Offline {
                record.session_id = None;
            }
        }
    }

    /// Adjust the in-flight task counter by `delta`.
    pub fn adjust_in_flight(&self, worker_name: &WorkerName, delta: i32) {
        if let Some(record) = self.workers.write().get_mut(worker_name) {
            record.in_flight_tasks = record.in_flight_tasks.saturating_add_signed(delta);
        }
    }

    /// Feed one latency observation into the worker's EWMA.
    pub fn observe_latency(&self, worker_name: &WorkerName, latency_ms: f64) {
        if let Some(record) = self.workers.write().get_mut(worker_name) {
            record.observed_latency_ms_ewma = if record.observed_latency_ms_ewma == 0.0 {
                latency_ms
            } else {
                LATENCY_ALPHA * latency_ms + (1.0 - LATENCY_ALPHA) * record.observed_latency_ms_ewma
            };
        }
    }

    /// O(1) lookup by name.
    #[must_use]
    pub fn get(&self, worker_name: &WorkerName) -> Option<WorkerRecord> {
        self.workers.read().get(worker_name).cloned()
    }

    /// Snapshot of every record, sorted by name for determinism.
    #[must_use]
    pub fn snapshot(&self) -> Vec<WorkerRecord> {
        let mut records: Vec<WorkerRecord> = self.workers.read().values().cloned().collect();
        records.sort_by(|a, b| a.worker_name.cmp(&b.worker_name));
        records
    }

    /// Mark workers offline whose heartbeat is older than `max_age`;
    /// returns the names that flipped.
    pub fn sweep_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> Vec<WorkerName> {
        let mut flipped = Vec::new();
        let mut workers = self.workers.write();
        for record in workers.values_mut() {
            if record.status != WorkerStatus::Offline && !record.heartbeat_fresh(now, max_age) {
                record.status = WorkerStatus::Offline;
                record.session_id = None;
                flipped.push(record.worker_name.clone());
            }
        }
        flipped
    }

    /// Number of registered workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    /// Whether the catalogue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.read().is_empty()
    }
}
