//! Fire-and-forget audit events.
//!
//! Every mutating operation records an audit event, even when the operation
//! itself fails. Recording never blocks a request: events go through a
//! bounded queue that drops the oldest entry on overflow and counts drops.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use meridian_core::UserId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// One audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Acting principal, when authenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<UserId>,
    /// Action name, e.g. `run.start` or `dispatch.reassigned`.
    pub action: String,
    /// Kind of target, e.g. `run` or `worker`.
    pub target_type: String,
    /// Target identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Structured details.
    pub details: Value,
    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Build an event timestamped now.
    #[must_use]
    pub fn new(
        actor_id: Option<UserId>,
        action: impl Into<String>,
        target_type: impl Into<String>,
        target_id: Option<String>,
        details: Value,
    ) -> Self {
        Self {
            actor_id,
            action: action.into(),
            target_type: target_type.into(),
            target_id,
            details,
            created_at: Utc::now(),
        }
    }
}

/// Serialize arbitrary details, falling back to a marker on failure.
#[must_use]
pub fn details_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value)
        .unwrap_or_else(|_| serde_json::json!({"error": "serialization_failed"}))
}

/// Anything that accepts audit events without blocking.
pub trait AuditSink: Send + Sync {
    /// Record one event. Must never block the caller.
    fn record(&self, event: AuditEvent);
}

/// Bounded drop-oldest audit queue.
///
/// Producers push without blocking; a background writer drains. On overflow
/// the oldest entry is discarded and a counter incremented.
#[derive(Debug)]
pub struct AuditQueue {
    queue: Mutex<VecDeque<AuditEvent>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl AuditQueue {
    /// Create a queue bounded to `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Drain up to `max` queued events.
    #[must_use]
    pub fn drain(&self, max: usize) -> Vec<AuditEvent> {
        let mut queue = self.queue.lock();
        let take = max.min(queue.len());
        queue.drain(..take).collect()
    }

    /// Events discarded because of overflow so far.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Events currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl AuditSink for AuditQueue {
    fn record(&self, event: AuditEvent) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(dropped, "audit queue overflow, oldest event discarded");
        }
        queue.push_back(event);
    }
}
