//! The session manager: handshake, resume, routing, sweeps.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use meridian_core::{SessionId, WorkerName};
use meridian_protocol::{
    AdminCmdPayload, CancelPayload, DispatchPayload, Frame, HelloAckPayload, HelloPayload,
    Message,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::events::GatewayEvent;
use crate::session::{Session, SessionState};
use crate::token;
use crate::worker::{WorkerCatalog, WorkerStatus};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Allowed worker bearer tokens.
    pub worker_tokens: Vec<String>,
    /// HMAC key for signed resume tokens.
    pub session_secret: String,
    /// Resume-token TTL, seconds.
    pub session_token_ttl_seconds: u64,
    /// Sliding-window size (clamped to 1..=64).
    pub session_window_size: usize,
    /// Expected heartbeat interval, seconds.
    pub heartbeat_interval_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            worker_tokens: Vec::new(),
            session_secret: "dev-session-secret".into(),
            session_token_ttl_seconds: 3600,
            session_window_size: meridian_protocol::DEFAULT_WINDOW_SIZE,
            heartbeat_interval_seconds: 20,
        }
    }
}

impl GatewayConfig {
    /// Window size clamped to what the ack bitmap can carry.
    #[must_use]
    pub fn effective_window_size(&self) -> usize {
        self.session_window_size
            .clamp(1, meridian_protocol::MAX_WINDOW_SIZE)
    }
}

/// Result of a successful handshake.
#[derive(Debug)]
pub struct HandshakeOutcome {
    /// The (fresh or resumed) session.
    pub session: Arc<Session>,
    /// Resume token to hand to the worker.
    pub resume_token: String,
    /// Whether this was a resume of a prior session.
    pub resumed: bool,
}

/// Owner of every live worker session.
pub struct SessionManager {
    config: GatewayConfig,
    sessions: DashMap<SessionId, Arc<Session>>,
    by_worker: DashMap<WorkerName, SessionId>,
    catalog: Arc<WorkerCatalog>,
    events: mpsc::UnboundedSender<GatewayEvent>,
}

impl SessionManager {
    /// Create a manager; the returned receiver carries [`GatewayEvent`]s.
    #[must_use]
    pub fn new(
        config: GatewayConfig,
        catalog: Arc<WorkerCatalog>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                config,
                sessions: DashMap::new(),
                by_worker: DashMap::new(),
                catalog,
                events,
            }),
            rx,
        )
    }

    /// The worker catalogue this manager maintains.
    #[must_use]
    pub fn catalog(&self) -> &Arc<WorkerCatalog> {
        &self.catalog
    }

    /// The gateway configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Process a `hello`: authenticate, resume or create the session, and
    /// register the worker in the catalogue.
    pub async fn handshake(&self, hello: &HelloPayload) -> Result<HandshakeOutcome, GatewayError> {
        if !self.token_allowed(&hello.token) {
            return Err(GatewayError::AuthFailed);
        }

        // Resume path: prior session id + valid resume token while the
        // session is still retained.
        if let (Some(prior), Some(resume_token)) =
            (hello.prior_session_id, hello.resume_token.as_deref())
        {
            if let Some(session) = self.sessions.get(&prior).map(|s| Arc::clone(s.value())) {
                token::verify(
                    resume_token,
                    prior,
                    &hello.worker_name,
                    Utc::now(),
                    self.config.session_secret.as_bytes(),
                )?;
                if session.worker_name != hello.worker_name {
                    return Err(GatewayError::ResumeRejected("worker name mismatch"));
                }
                // The worker's cumulative ack trims the window before replay.
                if let Some(acked) = hello.last_acked_seq {
                    session.handle_ack(meridian_protocol::Ack::cumulative(acked)).await;
                }
                return Ok(self.resume_session(&session, hello));
            }
            debug!(session = %prior, "prior session gone, falling back to fresh handshake");
        }

        // Fresh session: the name must not be bound to a live session.
        if let Some(existing) = self.by_worker.get(&hello.worker_name) {
            if let Some(session) = self.sessions.get(existing.value()) {
                if session.state() != SessionState::Closed {
                    return Err(GatewayError::Conflict(hello.worker_name.clone()));
                }
            }
        }

        let session_id = SessionId::v4();
        let session = Arc::new(Session::new(
            session_id,
            hello.worker_name.clone(),
            self.config.effective_window_size(),
        ));
        self.sessions.insert(session_id, Arc::clone(&session));
        self.by_worker
            .insert(hello.worker_name.clone(), session_id);
        self.register_worker(hello, session_id);

        let resume_token = self.issue_resume_token(&session);
        info!(worker = %hello.worker_name, session = %session_id, "worker connected");
        let _ = self.events.send(GatewayEvent::WorkerConnected {
            worker_name: hello.worker_name.clone(),
        });
        Ok(HandshakeOutcome {
            session,
            resume_token,
            resumed: false,
        })
    }

    fn resume_session(&self, session: &Arc<Session>, hello: &HelloPayload) -> HandshakeOutcome {
        self.by_worker
            .insert(hello.worker_name.clone(), session.session_id);
        self.register_worker(hello, session.session_id);
        let resume_token = self.issue_resume_token(session);
        info!(worker = %hello.worker_name, session = %session.session_id, "worker resuming session");
        HandshakeOutcome {
            session: Arc::clone(session),
            resume_token,
            resumed: true,
        }
    }

    fn register_worker(&self, hello: &HelloPayload, session_id: SessionId) {
        self.catalog.register(
            hello.worker_name.clone(),
            hello.capabilities.clone(),
            hello.packages.clone(),
            hello.queue.clone(),
            session_id,
        );
    }

    /// The `hello_ack` payload for a handshake outcome.
    #[must_use]
    pub fn hello_ack(&self, outcome: &HandshakeOutcome) -> HelloAckPayload {
        HelloAckPayload {
            session_id: outcome.session.session_id,
            resume_token: outcome.resume_token.clone(),
            window_size: self.config.effective_window_size(),
            heartbeat_interval_seconds: self.config.heartbeat_interval_seconds,
        }
    }

    fn issue_resume_token(&self, session: &Session) -> String {
        let expires =
            Utc::now() + chrono::Duration::seconds(self.config.session_token_ttl_seconds as i64);
        token::issue(
            session.session_id,
            &session.worker_name,
            expires,
            self.config.session_secret.as_bytes(),
        )
    }

    fn token_allowed(&self, presented: &str) -> bool {
        // Compare digests so candidate lengths leak nothing either.
        let presented_digest = Sha256::digest(presented.as_bytes());
        let mut allowed = false;
        for candidate in &self.config.worker_tokens {
            let candidate_digest = Sha256::digest(candidate.as_bytes());
            allowed |= bool::from(
                presented_digest
                    .as_slice()
                    .ct_eq(candidate_digest.as_slice()),
            );
        }
        allowed
    }

    /// The live session bound to a worker.
    pub fn session_for(&self, worker_name: &WorkerName) -> Result<Arc<Session>, GatewayError> {
        let session_id = self
            .by_worker
            .get(worker_name)
            .map(|e| *e.value())
            .ok_or_else(|| GatewayError::WorkerNotConnected(worker_name.clone()))?;
        let session = self
            .sessions
            .get(&session_id)
            .map(|s| Arc::clone(s.value()))
            .ok_or(GatewayError::SessionNotFound(session_id))?;
        if session.state() == SessionState::Closed {
            return Err(GatewayError::SessionClosed);
        }
        Ok(session)
    }

    /// Send a dispatch to a worker; stamps the payload with the assigned
    /// seq and returns it.
    pub async fn send_dispatch(
        &self,
        worker_name: &WorkerName,
        payload: DispatchPayload,
    ) -> Result<u64, GatewayError> {
        let session = self.session_for(worker_name)?;
        session
            .send_with(|seq| {
                let mut payload = payload;
                payload.seq = seq;
                Message::Dispatch(payload)
            })
            .await
    }

    /// Send a best-effort cancel for a task.
    pub async fn send_cancel(
        &self,
        worker_name: &WorkerName,
        payload: CancelPayload,
    ) -> Result<u64, GatewayError> {
        let session = self.session_for(worker_name)?;
        session.send(Message::Cancel(payload)).await
    }

    /// Deliver an admin command to a worker.
    pub async fn send_admin_command(
        &self,
        worker_name: &WorkerName,
        payload: AdminCmdPayload,
    ) -> Result<u64, GatewayError> {
        let session = self.session_for(worker_name)?;
        session.send(Message::AdminCmd(payload)).await
    }

    /// Note a transport loss; the session waits for resume within grace.
    pub fn mark_disconnected(&self, session_id: SessionId) {
        if let Some(session) = self.sessions.get(&session_id).map(|s| Arc::clone(s.value())) {
            if session.state() == SessionState::Closed {
                return;
            }
            session.mark_disconnected();
            self.catalog
                .set_status(&session.worker_name, WorkerStatus::Offline);
            info!(worker = %session.worker_name, session = %session_id, "worker disconnected");
            let _ = self.events.send(GatewayEvent::WorkerDisconnected {
                worker_name: session.worker_name.clone(),
                session_id,
            });
        }
    }

    /// Destroy sessions disconnected for longer than `grace`; emits
    /// [`GatewayEvent::SessionExpired`] per destroyed session so the
    /// orchestrator reschedules their in-flight tasks.
    pub fn sweep_expired(
        &self,
        now: chrono::DateTime<Utc>,
        grace: chrono::Duration,
    ) -> Vec<(WorkerName, SessionId)> {
        let mut expired = Vec::new();
        for entry in &self.sessions {
            let session = entry.value();
            if let Some(since) = session.disconnected_since() {
                if now - since > grace {
                    expired.push((session.worker_name.clone(), session.session_id));
                }
            }
        }
        for (worker_name, session_id) in &expired {
            self.destroy_session(*session_id);
            warn!(worker = %worker_name, session = %session_id, "session expired without resume");
            let _ = self.events.send(GatewayEvent::SessionExpired {
                worker_name: worker_name.clone(),
                session_id: *session_id,
            });
        }
        expired
    }

    /// Close and remove a session, unbinding the worker.
    pub fn destroy_session(&self, session_id: SessionId) {
        if let Some((_, session)) = self.sessions.remove(&session_id) {
            session.close();
            self.by_worker.remove(&session.worker_name);
            self.catalog
                .set_status(&session.worker_name, WorkerStatus::Offline);
        }
    }

    /// Handle one inbound frame on a session.
    ///
    /// Applies the piggybacked ack, drops duplicate seqs silently, and
    /// routes the message.
    pub async fn handle_frame(&self, session: &Arc<Session>, frame: Frame) {
        session.touch();
        self.catalog.heartbeat(&session.worker_name);

        // Acks on duplicate frames still carry fresh information.
        if let Some(ack) = frame.ack {
            session.handle_ack(ack).await;
        }
        if !session.note_received(frame.seq) {
            debug!(session = %session.session_id, seq = frame.seq, "duplicate frame dropped");
            return;
        }

        let worker_name = session.worker_name.clone();
        match frame.message {
            Message::Ping => {
                let _ = session.send(Message::Pong).await;
            }
            Message::Pong | Message::Ack => {}
            Message::DispatchAck(payload) => {
                let _ = self.events.send(GatewayEvent::DispatchAcked {
                    worker_name,
                    payload,
                });
            }
            Message::Result(payload) => {
                let _ = session.send(Message::Ack).await;
                let _ = self.events.send(GatewayEvent::TaskResult {
                    worker_name,
                    payload,
                });
            }
            Message::Progress(payload) => {
                let _ = self.events.send(GatewayEvent::TaskProgress {
                    worker_name,
                    payload,
                });
            }
            Message::WorkerCancel(payload) => {
                let _ = session.send(Message::Ack).await;
                let _ = self.events.send(GatewayEvent::WorkerCancelled {
                    worker_name,
                    payload,
                });
            }
            Message::AdminResult(payload) => {
                let _ = session.send(Message::Ack).await;
                let _ = self.events.send(GatewayEvent::AdminResult {
                    worker_name,
                    payload,
                });
            }
            Message::Bye(payload) => {
                info!(worker = %worker_name, reason = %payload.reason, "worker said bye");
                self.destroy_session(session.session_id);
            }
            Message::Hello(_) | Message::HelloAck(_) | Message::Dispatch(_)
            | Message::Cancel(_) | Message::AdminCmd(_) | Message::Resume(_) => {
                warn!(worker = %worker_name, kind = frame.message.kind(), "unexpected inbound kind ignored");
            }
        }
    }

    /// Emit a resume event once the transport re-attached (called by the IO
    /// layer after replay).
    pub fn note_resumed(&self, session: &Session, replayed: usize) {
        let _ = self.events.send(GatewayEvent::WorkerResumed {
            worker_name: session.worker_name.clone(),
            session_id: session.session_id,
            replayed,
        });
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}
