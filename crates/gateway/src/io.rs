//! Session IO: handshake acceptance and the per-connection pump.
//!
//! One task per connection owns the transport; outbound frames drain from
//! the session's channel, inbound frames route through the manager. Frames
//! survive the task — the session (and its window) lives in the manager and
//! is replayed on resume.

use std::sync::Arc;

use meridian_protocol::{ByePayload, Frame, Message};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::manager::SessionManager;
use crate::session::Session;
use crate::transport::Transport;

/// Accept one worker connection: read `hello`, handshake, answer
/// `hello_ack` (or `bye` with a reason), then pump frames until the
/// transport drops.
pub async fn accept_connection<T: Transport>(
    manager: Arc<SessionManager>,
    mut transport: T,
) -> Result<(), GatewayError> {
    let Some(first) = transport.recv().await? else {
        return Err(GatewayError::TransportClosed);
    };
    let Message::Hello(hello) = first.message else {
        let _ = transport
            .send(Frame::new(
                1,
                Message::Bye(ByePayload {
                    reason: "expected hello".into(),
                }),
            ))
            .await;
        return Err(GatewayError::TransportClosed);
    };

    let outcome = match manager.handshake(&hello).await {
        Ok(outcome) => outcome,
        Err(err) => {
            let reason = match &err {
                GatewayError::AuthFailed => "auth_failed",
                GatewayError::Conflict(_) => "conflict",
                GatewayError::ResumeRejected(_) => "resume_rejected",
                _ => "handshake_failed",
            };
            let _ = transport
                .send(Frame::new(
                    1,
                    Message::Bye(ByePayload {
                        reason: reason.into(),
                    }),
                ))
                .await;
            return Err(err);
        }
    };

    let session = Arc::clone(&outcome.session);
    session.touch();
    let _ = session.note_received(first.seq);

    // Attach before the hello_ack: replayed frames keep their original
    // seqs and therefore precede the ack in the stream.
    let (tx, rx) = mpsc::unbounded_channel();
    let replayed = session.attach(tx).await;
    if outcome.resumed {
        manager.note_resumed(&session, replayed);
    }
    let hello_ack = manager.hello_ack(&outcome);
    session.send(Message::HelloAck(hello_ack)).await?;

    run_session_io(manager, session, transport, rx).await;
    Ok(())
}

/// Pump one connection until the transport closes, then mark the session
/// disconnected so it can resume within grace.
pub async fn run_session_io<T: Transport>(
    manager: Arc<SessionManager>,
    session: Arc<Session>,
    mut transport: T,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
) {
    enum Step {
        Outbound(Option<Frame>),
        Inbound(Result<Option<Frame>, GatewayError>),
    }

    loop {
        // Resolve the race first, then act — the transport is needed
        // mutably on both sides.
        let step = tokio::select! {
            maybe_frame = outbound.recv() => Step::Outbound(maybe_frame),
            inbound = transport.recv() => Step::Inbound(inbound),
        };
        match step {
            Step::Outbound(Some(frame)) => {
                if let Err(err) = transport.send(frame).await {
                    warn!(session = %session.session_id, %err, "transport write failed");
                    break;
                }
            }
            // Session re-attached elsewhere or closed.
            Step::Outbound(None) => break,
            Step::Inbound(Ok(Some(frame))) => manager.handle_frame(&session, frame).await,
            Step::Inbound(Ok(None)) => {
                debug!(session = %session.session_id, "transport closed");
                break;
            }
            Step::Inbound(Err(err)) => {
                warn!(session = %session.session_id, %err, "transport read failed");
                break;
            }
        }
    }
    manager.mark_disconnected(session.session_id);
}
