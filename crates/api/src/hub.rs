//! The SSE event hub.
//!
//! Control events get a monotonic id and fan out over a broadcast channel;
//! a bounded ring keeps recent history so `Last-Event-ID` can resume.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use meridian_dispatch::ControlEvent;
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Default number of events retained for resume.
const RING_CAPACITY: usize = 1024;

/// A published event with its monotonic id.
pub type NumberedEvent = (u64, ControlEvent);

/// Fan-out hub with replayable history.
#[derive(Debug)]
pub struct EventHub {
    next_id: AtomicU64,
    ring: Mutex<VecDeque<NumberedEvent>>,
    sender: broadcast::Sender<NumberedEvent>,
}

impl EventHub {
    /// Create a hub.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            next_id: AtomicU64::new(1),
            ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            sender,
        }
    }

    /// Publish an event, assigning its id.
    pub fn publish(&self, event: ControlEvent) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut ring = self.ring.lock();
        if ring.len() >= RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back((id, event.clone()));
        drop(ring);
        let _ = self.sender.send((id, event));
        id
    }

    /// Subscribe, replaying retained events newer than `last_event_id`.
    #[must_use]
    pub fn subscribe(
        &self,
        last_event_id: Option<u64>,
    ) -> (Vec<NumberedEvent>, broadcast::Receiver<NumberedEvent>) {
        // Lock the ring before subscribing so no event published in
        // between is both missed in the backlog and absent from the
        // receiver.
        let ring = self.ring.lock();
        let receiver = self.sender.subscribe();
        let backlog = match last_event_id {
            Some(last) => ring.iter().filter(|(id, _)| *id > last).cloned().collect(),
            None => Vec::new(),
        };
        (backlog, receiver)
    }

    /// Consume a control-event stream into the hub.
    pub fn spawn_pump(
        self: &std::sync::Arc<Self>,
        mut rx: tokio::sync::mpsc::UnboundedReceiver<ControlEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let hub = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                hub.publish(event);
            }
        })
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
