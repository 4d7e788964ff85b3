#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Meridian Core
//!
//! Core types shared by every Meridian crate.
//!
//! ## Key Components
//!
//! - **Identifiers**: [`RunId`], [`TaskId`], [`DispatchId`], [`SessionId`],
//!   [`CommandId`], [`UserId`], [`TenantId`], [`WorkflowRecordId`] — typed
//!   UUID wrappers that cannot be mixed up at compile time.
//! - **Keys**: [`NodeKey`], [`WorkerName`], [`PortKey`] — author-chosen string
//!   identifiers that round-trip verbatim through snapshots and the wire.
//! - **Principal**: the authenticated caller with its role set, passed
//!   explicitly to every operation that needs it.

pub mod id;
pub mod keys;
pub mod principal;

pub use id::*;
pub use keys::{KeyError, NodeKey, PortKey, WorkerName};
pub use principal::{Principal, roles};

/// Common prelude for Meridian crates.
pub mod prelude {
    pub use super::{
        CommandId, DispatchId, KeyError, NodeKey, PortKey, Principal, RunId, SessionId, TaskId,
        TenantId, UserId, WorkerName, WorkflowRecordId,
    };
}
