#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Meridian API
//!
//! The HTTP surface of the control plane:
//!
//! - `POST /api/v1/runs` (idempotency keys), `GET /api/v1/runs`,
//!   `GET /api/v1/runs/{id}`, `GET /api/v1/runs/{id}/definition`,
//!   `POST /api/v1/runs/{id}/cancel`
//! - `GET /api/v1/workers`, `GET /api/v1/workers/{name}`,
//!   `POST /api/v1/workers/{name}/commands`
//! - `GET /api/v1/events` — SSE firehose with `Last-Event-ID` resume
//! - `GET /api/v1/control-plane` — worker WebSocket upgrade
//! - `GET /api/v1/healthz`
//!
//! All handlers take the authenticated [`Principal`] explicitly; every
//! error renders the shared `{error, message, request_id?, details?}`
//! payload.
//!
//! [`Principal`]: meridian_core::Principal

pub mod auth;
pub mod error;
pub mod hub;
pub mod routes;
pub mod state;
pub mod views;
pub mod ws;

pub use error::ApiError;
pub use hub::EventHub;
pub use state::Core;

use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Deadline applied to plain request/response routes. Streaming routes
/// (SSE, the control-plane WebSocket) are mounted outside it.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the full API router.
#[must_use]
pub fn router(core: Core) -> Router {
    let timed = Router::new()
        .route("/api/v1/healthz", get(routes::health::healthz))
        .route(
            "/api/v1/runs",
            post(routes::runs::start_run).get(routes::runs::list_runs),
        )
        .route("/api/v1/runs/{runId}", get(routes::runs::get_run))
        .route(
            "/api/v1/runs/{runId}/definition",
            get(routes::runs::get_run_definition),
        )
        .route("/api/v1/runs/{runId}/cancel", post(routes::runs::cancel_run))
        .route("/api/v1/workers", get(routes::workers::list_workers))
        .route("/api/v1/workers/{workerId}", get(routes::workers::get_worker))
        .route(
            "/api/v1/workers/{workerId}/commands",
            post(routes::workers::send_worker_command),
        )
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    Router::new()
        .merge(timed)
        .route("/api/v1/events", get(routes::events::sse_events))
        .route("/api/v1/control-plane", get(ws::control_plane_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(core)
}
