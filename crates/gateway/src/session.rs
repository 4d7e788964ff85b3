//! One control-plane session.
//!
//! A session outlives its transport: the send window and sequencing survive
//! a reconnect, and unacked frames are replayed in original seq order before
//! any new sends when the worker resumes within the grace window.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use meridian_core::{SessionId, WorkerName};
use meridian_protocol::{Ack, Frame, Message};
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc};

use crate::error::GatewayError;
use crate::window::SendWindow;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake in progress.
    Handshaking,
    /// Bidirectional flow.
    Active,
    /// Transport lost; awaiting resume within grace.
    Resuming,
    /// Destroyed; no further sends.
    Closed,
}

/// One logical bidirectional channel to a single worker.
pub struct Session {
    /// Session identifier.
    pub session_id: SessionId,
    /// The worker this session is bound to.
    pub worker_name: WorkerName,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    // The async mutex is the per-session writer lock: one sender appends
    // to the window and outbound channel at a time.
    window: tokio::sync::Mutex<SendWindow>,
    permits: Arc<Semaphore>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    recv_seq_next: Mutex<u64>,
    last_seen: Mutex<DateTime<Utc>>,
    disconnected_at: Mutex<Option<DateTime<Utc>>>,
}

impl Session {
    /// Create a session with a `window_size`-bounded send window.
    #[must_use]
    pub fn new(session_id: SessionId, worker_name: WorkerName, window_size: usize) -> Self {
        Self {
            session_id,
            worker_name,
            created_at: Utc::now(),
            state: Mutex::new(SessionState::Handshaking),
            window: tokio::sync::Mutex::new(SendWindow::new()),
            permits: Arc::new(Semaphore::new(window_size.max(1))),
            outbound: Mutex::new(None),
            recv_seq_next: Mutex::new(1),
            last_seen: Mutex::new(Utc::now()),
            disconnected_at: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Send a message, assigning the next seq and piggybacking a cumulative
    /// ack of everything received so far.
    ///
    /// Blocks while the window has `window_size` outstanding frames; the
    /// permit is released when the peer acknowledges the frame.
    pub async fn send(&self, message: Message) -> Result<u64, GatewayError> {
        self.send_with(|_| message).await
    }

    /// Like [`Session::send`], but the message is built from the assigned
    /// seq — for payloads that carry their own seq (dispatches).
    pub async fn send_with(
        &self,
        build: impl FnOnce(u64) -> Message,
    ) -> Result<u64, GatewayError> {
        if self.state() == SessionState::Closed {
            return Err(GatewayError::SessionClosed);
        }
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| GatewayError::SessionClosed)?;

        let mut window = self.window.lock().await;
        let seq = window.next_seq();
        let frame = Frame::with_ack(seq, self.inbound_ack(), build(seq));
        window.push(frame.clone(), Some(permit));
        if let Some(tx) = self.outbound.lock().as_ref() {
            let _ = tx.send(frame);
        }
        Ok(seq)
    }

    /// Apply a peer acknowledgement; returns how many frames it released.
    pub async fn handle_ack(&self, ack: Ack) -> usize {
        self.window.lock().await.apply_ack(ack)
    }

    /// Frames currently outstanding in the send window.
    pub async fn outstanding(&self) -> usize {
        self.window.lock().await.outstanding()
    }

    /// Attach a fresh transport writer, replaying unacked frames in original
    /// seq order before any new sends. Returns the number replayed.
    pub async fn attach(&self, tx: mpsc::UnboundedSender<Frame>) -> usize {
        // Window lock held across the swap: new sends queue behind replay.
        let window = self.window.lock().await;
        let pending = window.unacked_frames();
        for frame in &pending {
            let _ = tx.send(frame.clone());
        }
        *self.outbound.lock() = Some(tx);
        *self.state.lock() = SessionState::Active;
        *self.disconnected_at.lock() = None;
        pending.len()
    }

    /// Note transport loss; the session waits for resume.
    pub fn mark_disconnected(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Closed {
            return;
        }
        *state = SessionState::Resuming;
        *self.outbound.lock() = None;
        *self.disconnected_at.lock() = Some(Utc::now());
    }

    /// When the transport was lost, if currently disconnected.
    #[must_use]
    pub fn disconnected_since(&self) -> Option<DateTime<Utc>> {
        *self.disconnected_at.lock()
    }

    /// Record an inbound seq. Returns `false` for duplicates, which the
    /// caller drops silently.
    #[must_use]
    pub fn note_received(&self, seq: u64) -> bool {
        let mut next = self.recv_seq_next.lock();
        if seq < *next {
            return false;
        }
        *next = seq + 1;
        true
    }

    /// Cumulative ack covering everything received so far.
    #[must_use]
    pub fn inbound_ack(&self) -> Ack {
        Ack::cumulative(self.recv_seq_next.lock().saturating_sub(1))
    }

    /// Update liveness on any inbound traffic.
    pub fn touch(&self) {
        *self.last_seen.lock() = Utc::now();
    }

    /// Last inbound activity.
    #[must_use]
    pub fn last_seen(&self) -> DateTime<Utc> {
        *self.last_seen.lock()
    }

    /// Destroy the session. Pending senders error out.
    pub fn close(&self) {
        *self.state.lock() = SessionState::Closed;
        *self.outbound.lock() = None;
        self.permits.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("worker_name", &self.worker_name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn session(window: usize) -> Session {
        Session::new(
            SessionId::v4(),
            WorkerName::new("worker-1").unwrap(),
            window,
        )
    }

    #[tokio::test]
    async fn seq_monotonic_across_sends() {
        let session = session(8);
        let (tx, mut rx) = mpsc::unbounded_channel();
        session.attach(tx).await;

        let s1 = session.send(Message::Ping).await.unwrap();
        let s2 = session.send(Message::Ping).await.unwrap();
        assert!(s2 > s1);
        assert_eq!(rx.recv().await.unwrap().seq, s1);
        assert_eq!(rx.recv().await.unwrap().seq, s2);
    }

    #[tokio::test]
    async fn window_full_blocks_sender() {
        let session = Arc::new(session(2));
        let (tx, _rx) = mpsc::unbounded_channel();
        session.attach(tx).await;

        session.send(Message::Ping).await.unwrap();
        session.send(Message::Ping).await.unwrap();

        // Third send must block until an ack frees a slot.
        let blocked = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.send(Message::Ping).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!blocked.is_finished(), "sender should be blocked on full window");

        session.handle_ack(Ack::cumulative(1)).await;
        let seq = blocked.await.unwrap().unwrap();
        assert_eq!(seq, 3);
    }

    #[tokio::test]
    async fn duplicate_inbound_seq_detected() {
        let session = session(8);
        assert!(session.note_received(1));
        assert!(session.note_received(2));
        assert!(!session.note_received(2));
        assert!(!session.note_received(1));
        assert!(session.note_received(3));
        assert_eq!(session.inbound_ack(), Ack::cumulative(3));
    }

    #[tokio::test]
    async fn attach_replays_unacked_in_order() {
        let session = session(8);
        let (tx, mut rx) = mpsc::unbounded_channel();
        session.attach(tx).await;
        for _ in 0..5 {
            session.send(Message::Ping).await.unwrap();
        }
        session.handle_ack(Ack::cumulative(2)).await;
        session.mark_disconnected();
        assert_eq!(session.state(), SessionState::Resuming);
        drop(rx);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let replayed = session.attach(tx).await;
        assert_eq!(replayed, 3);
        assert_eq!(session.state(), SessionState::Active);
        for expected in [3u64, 4, 5] {
            assert_eq!(rx.recv().await.unwrap().seq, expected);
        }
    }

    #[tokio::test]
    async fn send_after_close_errors() {
        let session = session(2);
        session.close();
        assert!(matches!(
            session.send(Message::Ping).await.unwrap_err(),
            GatewayError::SessionClosed
        ));
    }

    #[tokio::test]
    async fn close_unblocks_waiting_sender() {
        let session = Arc::new(session(1));
        let (tx, _rx) = mpsc::unbounded_channel();
        session.attach(tx).await;
        session.send(Message::Ping).await.unwrap();

        let blocked = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.send(Message::Ping).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        session.close();
        assert!(blocked.await.unwrap().is_err());
    }
}
