#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Meridian Workflow
//!
//! The immutable workflow snapshot model and everything derived from it
//! before a run executes:
//!
//! - [`WorkflowSnapshot`] — nodes, edges, middlewares, subgraphs (camelCase
//!   JSON on the wire)
//! - [`BindingPath`] — JSON-pointer-like paths rooted at `/results/…` or
//!   `/parameters/…`
//! - [`MiddlewareHandle`] — the `mw:<id>:input:<key>` target-port syntax
//! - [`DependencyGraph`] — cycle check, entry/exit nodes, host-level edges
//! - [`ScopeIndex`] — node → container/subgraph scope
//! - [`validate_snapshot`] — every structural rule a snapshot must satisfy
//!   before a run is created

pub mod error;
pub mod graph;
pub mod handle;
pub mod path;
pub mod scope;
pub mod snapshot;
pub mod validate;

pub use error::WorkflowError;
pub use graph::DependencyGraph;
pub use handle::MiddlewareHandle;
pub use path::{BindingPath, BindingRoot};
pub use scope::{NodeScope, ScopeIndex};
pub use snapshot::{
    BindingMode, ContainerConfig, Edge, EdgeEndpoint, LoopPolicy, NodeSpec, NodeUi, PackageRef,
    Port, PortBinding, Position, RetryPolicy, WorkflowMetadata, WorkflowSnapshot,
    WorkflowSubgraph,
};
pub use validate::validate_snapshot;
