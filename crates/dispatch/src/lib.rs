#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Meridian Dispatch
//!
//! The orchestrator between readiness signals and the worker gateway:
//!
//! - [`SelectionStrategy`] — `default | least_inflight | least_latency |
//!   random`, filtered by capability, package, liveness, and affinity
//! - [`RetryBackoff`] — capped exponential backoff with jitter
//! - [`InFlightTable`] — dispatched tasks and their ack deadlines
//! - [`Orchestrator`] — dispatch emission, gateway event handling, deadline
//!   sweeps, reassignment, terminal aggregation
//! - [`RunStateService`] — the façade the HTTP layer drives

pub mod backoff;
pub mod error;
pub mod events;
pub mod inflight;
pub mod orchestrator;
pub mod request;
pub mod selection;
pub mod service;

pub use backoff::RetryBackoff;
pub use error::DispatchError;
pub use events::ControlEvent;
pub use inflight::{InFlightTable, InFlightTask};
pub use orchestrator::{DispatchConfig, Orchestrator};
pub use request::{build_dispatch, validate_chain};
pub use selection::{SelectionRequirements, SelectionStrategy, select_worker};
pub use service::RunStateService;
