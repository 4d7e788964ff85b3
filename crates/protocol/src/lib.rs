#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Meridian Protocol
//!
//! The control-plane wire protocol between the scheduler and its workers.
//!
//! Every frame is one JSON object: a strictly monotonic `seq`, an optional
//! piggybacked [`Ack`], and a kind-tagged [`Message`] with a schema-validated
//! payload. Unknown kinds are rejected at parse time.

pub mod frame;
pub mod message;
pub mod next_error;

pub use frame::{Ack, Frame};
pub use message::{
    AdminCmdPayload, AdminCommand, AdminCommandStatus, AdminResultPayload, ByePayload,
    CancelPayload, DispatchAckPayload, DispatchPayload, ErrorInfo, HelloAckPayload, HelloPayload,
    Message, ProgressPayload, ResultPayload, ResumePayload, TaskResultStatus, WorkerCancelPayload,
    WorkerCancelReason,
};
pub use next_error::NextErrorCode;

/// Default sliding-window size for session acknowledgement.
pub const DEFAULT_WINDOW_SIZE: usize = 64;

/// Largest supported window size; the ack bitmap is a `u64` mask.
pub const MAX_WINDOW_SIZE: usize = 64;
