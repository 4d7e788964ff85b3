//! The framed duplex transport seam.
//!
//! The session layer only needs ordered, framed, bidirectional delivery.
//! Production connections adapt a WebSocket; tests use the in-memory pair
//! from [`duplex`].

use async_trait::async_trait;
use meridian_protocol::Frame;
use tokio::sync::mpsc;

use crate::error::GatewayError;

/// Ordered framed duplex stream.
#[async_trait]
pub trait Transport: Send {
    /// Send one frame. Errors when the peer is gone.
    async fn send(&mut self, frame: Frame) -> Result<(), GatewayError>;

    /// Receive the next frame. `Ok(None)` on orderly close.
    async fn recv(&mut self) -> Result<Option<Frame>, GatewayError>;
}

/// In-memory transport endpoint (one side of a [`duplex`] pair).
#[derive(Debug)]
pub struct InMemoryTransport {
    tx: mpsc::Sender<Frame>,
    rx: mpsc::Receiver<Frame>,
}

/// Create a connected in-memory transport pair.
#[must_use]
pub fn duplex(capacity: usize) -> (InMemoryTransport, InMemoryTransport) {
    let (a_tx, a_rx) = mpsc::channel(capacity);
    let (b_tx, b_rx) = mpsc::channel(capacity);
    (
        InMemoryTransport { tx: a_tx, rx: b_rx },
        InMemoryTransport { tx: b_tx, rx: a_rx },
    )
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), GatewayError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| GatewayError::TransportClosed)
    }

    async fn recv(&mut self) -> Result<Option<Frame>, GatewayError> {
        Ok(self.rx.recv().await)
    }
}
