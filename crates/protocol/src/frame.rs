//! Frames: seq + optional piggybacked ack + kind-tagged message.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Sliding-window acknowledgement.
///
/// `up_to` acknowledges every seq `≤ up_to` cumulatively. `bitmap`
/// selectively acknowledges seqs above that base: bit `i` set means
/// `up_to + 1 + i` is acknowledged. The window never exceeds 64, so a
/// `u64` mask covers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ack {
    /// Highest cumulatively acknowledged seq.
    pub up_to: u64,
    /// Selective-ack mask above `up_to`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitmap: Option<u64>,
}

impl Ack {
    /// Purely cumulative ack.
    #[must_use]
    pub fn cumulative(up_to: u64) -> Self {
        Self {
            up_to,
            bitmap: None,
        }
    }

    /// Returns `true` if this ack covers the given seq.
    #[must_use]
    pub fn covers(&self, seq: u64) -> bool {
        if seq <= self.up_to {
            return true;
        }
        match self.bitmap {
            Some(mask) => {
                let offset = seq - self.up_to - 1;
                offset < 64 && mask & (1 << offset) != 0
            }
            None => false,
        }
    }
}

/// One wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Strictly monotonic per-session sequence number.
    pub seq: u64,
    /// Optional piggybacked acknowledgement of the peer's frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<Ack>,
    /// The message (`kind` + `payload` fields on the wire).
    #[serde(flatten)]
    pub message: Message,
}

impl Frame {
    /// Frame without a piggybacked ack.
    #[must_use]
    pub fn new(seq: u64, message: Message) -> Self {
        Self {
            seq,
            ack: None,
            message,
        }
    }

    /// Frame with a piggybacked ack.
    #[must_use]
    pub fn with_ack(seq: u64, ack: Ack, message: Message) -> Self {
        Self {
            seq,
            ack: Some(ack),
            message,
        }
    }

    /// Encode to the wire representation.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from the wire representation.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
