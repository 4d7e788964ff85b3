#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Meridian Gateway
//!
//! The control-plane side of the worker protocol:
//!
//! - [`Session`] — one logical bidirectional channel to a worker, with
//!   strictly monotonic sequencing, sliding-window acknowledgement,
//!   backpressure, and replay-on-resume
//! - [`SessionManager`] — handshake (token allowlist, name conflicts),
//!   resume within a grace window, disconnect sweeps, and message routing
//! - [`WorkerCatalog`] — the worker records dispatch selection reads
//! - [`Transport`] — the framed duplex seam; an in-memory pair ships for
//!   tests, the WebSocket adapter lives in the HTTP layer

pub mod error;
pub mod events;
pub mod io;
pub mod manager;
pub mod session;
pub mod token;
pub mod transport;
pub mod window;
pub mod worker;

pub use error::GatewayError;
pub use events::GatewayEvent;
pub use io::{accept_connection, run_session_io};
pub use manager::{GatewayConfig, HandshakeOutcome, SessionManager};
pub use session::{Session, SessionState};
pub use transport::{InMemoryTransport, Transport, duplex};
pub use window::SendWindow;
pub use worker::{WorkerCatalog, WorkerRecord, WorkerStatus};
