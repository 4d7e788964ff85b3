//! The core façade handed to every handler.
//!
//! One explicit struct built at startup and passed through axum state — no
//! module-level singletons.

use std::sync::Arc;

use meridian_dispatch::RunStateService;
use meridian_gateway::SessionManager;
use meridian_storage::{AuditSink, IdempotencyStore, PrincipalStore, WorkflowStore};

use crate::hub::EventHub;

/// Everything the HTTP layer needs, wired once at startup.
#[derive(Clone)]
pub struct Core {
    /// Run and worker operations.
    pub service: RunStateService,
    /// The worker gateway (WebSocket handshakes).
    pub gateway: Arc<SessionManager>,
    /// Bearer-token resolution.
    pub principals: Arc<dyn PrincipalStore>,
    /// Idempotency-key claims.
    pub idempotency: Arc<dyn IdempotencyStore>,
    /// Fire-and-forget audit sink.
    pub audit: Arc<dyn AuditSink>,
    /// Stored workflow definitions.
    pub workflows: Arc<dyn WorkflowStore>,
    /// SSE fan-out hub.
    pub events: Arc<EventHub>,
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core").finish_non_exhaustive()
    }
}
