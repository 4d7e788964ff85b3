//! The control-plane WebSocket: workers connect here.

use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use meridian_gateway::{GatewayError, Transport, accept_connection};
use meridian_protocol::Frame;
use tracing::{debug, warn};

use crate::state::Core;

/// `GET /api/v1/control-plane` — upgrade and hand the socket to the
/// gateway. Authentication happens inside the protocol handshake (`hello`
/// carries the worker token).
pub async fn control_plane_upgrade(State(core): State<Core>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| async move {
        let transport = WsTransport { socket };
        if let Err(err) = accept_connection(core.gateway, transport).await {
            debug!(%err, "worker connection ended with error");
        }
    })
}

/// Framed transport over one WebSocket.
struct WsTransport {
    socket: WebSocket,
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), GatewayError> {
        let text = frame.encode()?;
        self.socket
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|_| GatewayError::TransportClosed)
    }

    async fn recv(&mut self) -> Result<Option<Frame>, GatewayError> {
        while let Some(message) = self.socket.recv().await {
            match message {
                Ok(WsMessage::Text(text)) => return Ok(Some(Frame::decode(text.as_str())?)),
                Ok(WsMessage::Close(_)) => return Ok(None),
                Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => {}
                Ok(WsMessage::Binary(_)) => {
                    warn!("binary control-plane frame ignored");
                }
                Err(_) => return Err(GatewayError::TransportClosed),
            }
        }
        Ok(None)
    }
}
