//! Worker endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use meridian_core::{WorkerName, roles};
use meridian_error::{bad_request, conflict, not_found};
use meridian_protocol::AdminCommand;
use meridian_storage::{AuditEvent, IdempotencyClaim, details_json, fingerprint};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::auth::{AuthPrincipal, require_roles};
use crate::error::ApiError;
use crate::state::Core;
use crate::views::{CommandRef, Page, WorkerView};

/// Query parameters for `GET /api/v1/workers`.
#[derive(Debug, Deserialize)]
pub struct ListWorkersQuery {
    /// Filter by logical queue.
    pub queue: Option<String>,
    /// Page size (1..=200, default 50).
    pub limit: Option<usize>,
    /// Worker name to resume after.
    pub cursor: Option<String>,
}

/// `GET /api/v1/workers` — the scheduler's worker view.
pub async fn list_workers(
    State(core): State<Core>,
    AuthPrincipal(principal): AuthPrincipal,
    Query(query): Query<ListWorkersQuery>,
) -> Result<Json<Page<WorkerView>>, ApiError> {
    require_roles(&principal, roles::RUN_VIEW)?;

    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let mut records = core.service.list_workers();
    if let Some(queue) = &query.queue {
        records.retain(|r| &r.queue == queue);
    }
    let start = match &query.cursor {
        Some(cursor) => records
            .iter()
            .position(|r| r.worker_name.as_str() == cursor)
            .map_or(0, |i| i + 1),
        None => 0,
    };
    let page: Vec<WorkerView> = records
        .iter()
        .skip(start)
        .take(limit)
        .map(WorkerView::from_record)
        .collect();
    let next_cursor = (page.len() == limit)
        .then(|| page.last().map(|w| w.worker_name.clone()))
        .flatten();
    Ok(Json(Page {
        items: page,
        next_cursor,
    }))
}

/// `GET /api/v1/workers/{workerId}`.
pub async fn get_worker(
    State(core): State<Core>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(worker_id): Path<String>,
) -> Result<Json<WorkerView>, ApiError> {
    require_roles(&principal, roles::RUN_VIEW)?;
    let name = WorkerName::new(worker_id.clone())
        .map_err(|_| ApiError(not_found(format!("worker not found: {worker_id}"))))?;
    let record = core
        .service
        .get_worker(&name)
        .ok_or_else(|| ApiError(not_found(format!("worker not found: {worker_id}"))))?;
    Ok(Json(WorkerView::from_record(&record)))
}

/// Body of `POST /api/v1/workers/{workerId}/commands`.
#[derive(Debug, Deserialize)]
pub struct WorkerCommandRequest {
    /// `drain`, `rebind`, `pkg.install`, or `pkg.uninstall`.
    pub command: AdminCommand,
    /// Command-specific arguments.
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// `POST /api/v1/workers/{workerId}/commands` → `202 {commandId}`.
pub async fn send_worker_command(
    State(core): State<Core>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(worker_id): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<CommandRef>), ApiError> {
    require_roles(&principal, roles::RUN_MUTATE)?;

    let request: WorkerCommandRequest = serde_json::from_slice(&body)
        .map_err(|err| ApiError(bad_request(format!("invalid request body: {err}"))))?;
    let name = WorkerName::new(worker_id.clone())
        .map_err(|_| ApiError(not_found(format!("worker not found: {worker_id}"))))?;
    if core.service.get_worker(&name).is_none() {
        return Err(ApiError(not_found(format!(
            "worker not found: {worker_id}"
        ))));
    }

    // Worker-command POSTs honour idempotency keys like StartRun does.
    let command_id = meridian_core::CommandId::v4();
    if let Some(key) = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
    {
        let fp = fingerprint(&body);
        match core.idempotency.claim(key, &fp, &command_id.to_string()) {
            IdempotencyClaim::Accepted => {}
            IdempotencyClaim::Replayed(original) => {
                return Ok((
                    StatusCode::ACCEPTED,
                    Json(CommandRef {
                        command_id: original,
                        status: "accepted".into(),
                    }),
                ));
            }
            IdempotencyClaim::Conflict => {
                return Err(ApiError(
                    conflict("idempotency key reused with a different body")
                        .with_details(json!({"idempotency_key": key})),
                ));
            }
        }
    }

    let outcome = core
        .service
        .send_worker_command(&name, command_id, request.command, request.args.clone())
        .await;

    core.audit.record(AuditEvent::new(
        Some(principal.user_id),
        "worker.command",
        "worker",
        Some(worker_id.clone()),
        details_json(&json!({
            "command": request.command,
            "outcome": if outcome.is_ok() { "accepted" } else { "rejected" },
        })),
    ));

    let command_id = outcome?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CommandRef {
            command_id: command_id.to_string(),
            status: "accepted".into(),
        }),
    ))
}
