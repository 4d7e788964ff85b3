//! The outbound sliding window.
//!
//! Unacked frames sit in a per-session ring bounded by the window size;
//! each entry holds the semaphore permit its sender acquired, so releasing
//! an entry (cumulative or selective ack) unblocks the next sender.

use std::collections::VecDeque;

use meridian_protocol::{Ack, Frame};
use tokio::sync::OwnedSemaphorePermit;

struct Entry {
    frame: Frame,
    acked: bool,
    _permit: Option<OwnedSemaphorePermit>,
}

/// Sequencing and retransmission state for one direction of a session.
pub struct SendWindow {
    next_seq: u64,
    base: u64,
    entries: VecDeque<Entry>,
}

impl SendWindow {
    /// Fresh window; the first assigned seq is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_seq: 1,
            base: 0,
            entries: VecDeque::new(),
        }
    }

    /// Assign the next strictly monotonic seq.
    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Track an outbound frame until it is acknowledged.
    pub fn push(&mut self, frame: Frame, permit: Option<OwnedSemaphorePermit>) {
        self.entries.push_back(Entry {
            frame,
            acked: false,
            _permit: permit,
        });
    }

    /// Apply a peer acknowledgement; returns how many entries were released.
    ///
    /// Replaying an identical ack releases nothing and leaves the window
    /// unchanged.
    pub fn apply_ack(&mut self, ack: Ack) -> usize {
        for entry in &mut self.entries {
            if !entry.acked && ack.covers(entry.frame.seq) {
                entry.acked = true;
            }
        }
        let mut released = 0;
        while let Some(front) = self.entries.front() {
            if !front.acked {
                break;
            }
            self.base = front.frame.seq;
            self.entries.pop_front();
            released += 1;
        }
        released
    }

    /// Frames not yet acknowledged, in original seq order.
    #[must_use]
    pub fn unacked_frames(&self) -> Vec<Frame> {
        self.entries
            .iter()
            .filter(|e| !e.acked)
            .map(|e| e.frame.clone())
            .collect()
    }

    /// Entries still held in the window (acked-but-gapped included).
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.entries.len()
    }

    /// Highest cumulatively acknowledged seq.
    #[must_use]
    pub fn base(&self) -> u64 {
        self.base
    }
}

impl Default for SendWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SendWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendWindow")
            .field("next_seq", &self.next_seq)
            .field("base", &self.base)
            .field("outstanding", &self.entries.len())
            .finish()
    }
}
