#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Meridian Registry
//!
//! Owner of all mutable run state.
//!
//! The registry creates runs from immutable snapshots, derives everything
//! needed before execution (scope index, edge bindings, middleware chains),
//! applies worker-reported transitions, and computes which nodes become
//! newly ready:
//!
//! - [`RunStatus`] and [`NodeRunStatus`] — validated state machines
//! - [`RunRecord`] and [`NodeRunState`] — per-run mutable state
//! - [`EdgeBinding`] — derived source-result → target-parameter writes
//! - [`ReadyNode`] — the next dispatchable unit (node or middleware hop)
//! - [`RunRegistry`] — the async operation surface, serialised per run

pub mod binding;
pub mod error;
pub mod ready;
pub mod record;
pub mod registry;
pub mod status;
pub mod transition;

pub use binding::{EdgeBinding, build_edge_bindings};
pub use error::RegistryError;
pub use ready::ReadyNode;
pub use record::{NodeRunState, RunRecord, StartRunRequest};
pub use registry::{CancelOutcome, DispatchMark, ResultApplication, RunRegistry};
pub use status::{NodeRunStatus, RunStatus};
