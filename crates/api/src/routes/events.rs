//! The SSE firehose.
//!
//! Every run/worker state change streams to every subscriber; the
//! `Last-Event-ID` header resumes from the retained ring.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use futures::stream::{self, StreamExt};
use meridian_core::roles;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::auth::{AuthPrincipal, require_roles};
use crate::error::ApiError;
use crate::hub::NumberedEvent;
use crate::state::Core;

/// Query parameters for `GET /api/v1/events`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    /// Frontend-generated session identifier used to route SSE events.
    #[allow(dead_code)]
    pub client_session_id: Option<String>,
}

fn to_sse(numbered: NumberedEvent) -> Event {
    let (id, event) = numbered;
    let data = serde_json::to_string(&event)
        .unwrap_or_else(|_| "{\"error\":\"serialization_failed\"}".to_string());
    Event::default().id(id.to_string()).data(data)
}

/// `GET /api/v1/events` — the global event stream.
pub async fn sse_events(
    State(core): State<Core>,
    AuthPrincipal(principal): AuthPrincipal,
    Query(_query): Query<EventsQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    require_roles(&principal, roles::RUN_VIEW)?;

    let last_event_id = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| raw.parse::<u64>().ok());

    let (backlog, receiver) = core.events.subscribe(last_event_id);
    let backlog_stream = stream::iter(backlog).map(|numbered| Ok(to_sse(numbered)));
    let live_stream = BroadcastStream::new(receiver).filter_map(|item| async move {
        match item {
            Ok(numbered) => Some(Ok(to_sse(numbered))),
            Err(lagged) => {
                // A slow consumer missed events; it catches up from here.
                debug!(%lagged, "sse subscriber lagged");
                None
            }
        }
    });

    Ok(Sse::new(backlog_stream.chain(live_stream)).keep_alive(KeepAlive::default()))
}
