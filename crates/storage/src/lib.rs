#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Meridian Storage
//!
//! The record-store surface the control plane consumes. The core treats
//! storage as a key-value / queryable record store:
//!
//! - [`PrincipalStore`] — bearer token → authenticated principal with roles
//! - [`WorkflowStore`] — stored workflow definitions, looked up by origin id
//! - [`IdempotencyStore`] — idempotency-key claims with body fingerprints
//! - [`AuditSink`] and [`AuditQueue`] — fire-and-forget audit events through
//!   a bounded, drop-oldest queue
//!
//! In-memory implementations ship here; relational backends live outside
//! the core.

pub mod audit;
pub mod idempotency;
pub mod principal;
pub mod workflows;

pub use audit::{AuditEvent, AuditQueue, AuditSink, details_json};
pub use idempotency::{IdempotencyClaim, IdempotencyStore, InMemoryIdempotencyStore, fingerprint};
pub use principal::{InMemoryPrincipalStore, PrincipalStore};
pub use workflows::{InMemoryWorkflowStore, StoredWorkflow, WorkflowStore};
