//! Run endpoints.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use meridian_core::{RunId, roles};
use meridian_error::{bad_request, conflict, not_found};
use meridian_registry::{RunStatus, StartRunRequest};
use meridian_storage::{AuditEvent, IdempotencyClaim, details_json, fingerprint};
use meridian_workflow::WorkflowSnapshot;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{AuthPrincipal, require_roles};
use crate::error::ApiError;
use crate::state::Core;
use crate::views::{Page, RunView, StartRunResponse};

const IDEMPOTENCY_HEADER: &str = "idempotency-key";

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(IDEMPOTENCY_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| ApiError(bad_request("malformed idempotency key")))?;
    if key.is_empty() || key.len() > 64 {
        return Err(ApiError(bad_request(
            "idempotency key must be 1..=64 characters",
        )));
    }
    Ok(Some(key.to_string()))
}

/// `POST /api/v1/runs` → `202 {runId}`.
///
/// Honours an `Idempotency-Key` header: replaying the same key with an
/// identical body returns the original run id; a different body is a 409.
pub async fn start_run(
    State(core): State<Core>,
    AuthPrincipal(principal): AuthPrincipal,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<StartRunResponse>), ApiError> {
    require_roles(&principal, roles::RUN_MUTATE)?;

    let mut request: StartRunRequest = serde_json::from_slice(&body)
        .map_err(|err| ApiError(bad_request(format!("invalid request body: {err}"))))?;

    // A snapshot sent without nodes refers to a stored definition by its
    // origin id.
    if request.workflow.nodes.is_empty() {
        if let Some(stored) = core
            .workflows
            .get_by_origin(&request.workflow.metadata.origin_id)
            .await
        {
            request.workflow = serde_json::from_value::<WorkflowSnapshot>(stored.definition)
                .map_err(|err| {
                    ApiError(bad_request(format!("stored definition is unusable: {err}")))
                })?;
        }
    }

    let run_id = RunId::v4();
    let claimed_key = match idempotency_key(&headers)? {
        Some(key) => {
            let fp = fingerprint(&body);
            match core.idempotency.claim(&key, &fp, &run_id.to_string()) {
                IdempotencyClaim::Accepted => Some(key),
                IdempotencyClaim::Replayed(original) => {
                    return Ok((
                        StatusCode::ACCEPTED,
                        Json(StartRunResponse { run_id: original }),
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
        None => None,
    };

    let outcome = core
        .service
        .start_run(run_id, &request, principal.tenant)
        .await;

    core.audit.record(AuditEvent::new(
        Some(principal.user_id),
        "run.start",
        "run",
        Some(run_id.to_string()),
        details_json(&json!({
            "client_id": request.client_id,
            "workflow_id": request.workflow.id,
            "outcome": if outcome.is_ok() { "accepted" } else { "rejected" },
        })),
    ));

    match outcome {
        Ok(_) => Ok((
            StatusCode::ACCEPTED,
            Json(StartRunResponse {
                run_id: run_id.to_string(),
            }),
        )),
        Err(err) => {
            if let Some(key) = claimed_key {
                core.idempotency.release(&key);
            }
            Err(err.into())
        }
    }
}

/// Query parameters for `GET /api/v1/runs`.
#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    /// Page size (1..=200, default 50).
    pub limit: Option<usize>,
    /// Opaque cursor from a previous page.
    pub cursor: Option<String>,
    /// Filter by run status.
    pub status: Option<String>,
    /// Filter by client id.
    pub client_id: Option<String>,
}

/// `GET /api/v1/runs` — cursor-paginated, newest first.
pub async fn list_runs(
    State(core): State<Core>,
    AuthPrincipal(principal): AuthPrincipal,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Page<RunView>>, ApiError> {
    require_roles(&principal, roles::RUN_VIEW)?;

    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let cursor = match &query.cursor {
        Some(raw) => Some(
            RunId::parse(raw).map_err(|_| ApiError(bad_request("malformed cursor")))?,
        ),
        None => None,
    };
    let status = match &query.status {
        Some(raw) => Some(
            serde_json::from_value::<RunStatus>(json!(raw))
                .map_err(|_| ApiError(bad_request(format!("unknown status: {raw}"))))?,
        ),
        None => None,
    };

    let (records, next) = core
        .service
        .list_runs(limit, cursor, status, query.client_id.as_deref())
        .await;
    Ok(Json(Page {
        items: records.iter().map(RunView::from_record).collect(),
        next_cursor: next.map(|id| id.to_string()),
    }))
}

fn parse_run_id(raw: &str) -> Result<RunId, ApiError> {
    RunId::parse(raw).map_err(|_| ApiError(not_found(format!("run not found: {raw}"))))
}

/// `GET /api/v1/runs/{runId}`.
pub async fn get_run(
    State(core): State<Core>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(run_id): Path<String>,
) -> Result<Json<RunView>, ApiError> {
    require_roles(&principal, roles::RUN_VIEW)?;
    let run_id = parse_run_id(&run_id)?;
    let record = core.service.get_run(run_id).await?;
    Ok(Json(RunView::from_record(&record)))
}

/// `GET /api/v1/runs/{runId}/definition` — the immutable snapshot.
pub async fn get_run_definition(
    State(core): State<Core>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_roles(&principal, roles::RUN_VIEW)?;
    let run_id = parse_run_id(&run_id)?;
    let record = core.service.get_run(run_id).await?;
    let snapshot = serde_json::to_value(record.workflow.as_ref())
        .map_err(|err| ApiError(meridian_error::internal_error(err.to_string())))?;
    Ok(Json(snapshot))
}

/// `POST /api/v1/runs/{runId}/cancel` → `202`. Idempotent.
pub async fn cancel_run(
    State(core): State<Core>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(run_id): Path<String>,
) -> Result<(StatusCode, Json<RunView>), ApiError> {
    require_roles(&principal, roles::RUN_MUTATE)?;
    let run_id = parse_run_id(&run_id)?;

    let outcome = core.service.cancel_run(run_id).await;
    core.audit.record(AuditEvent::new(
        Some(principal.user_id),
        "run.cancel",
        "run",
        Some(run_id.to_string()),
        details_json(&json!({
            "outcome": if outcome.is_ok() { "accepted" } else { "rejected" },
        })),
    ));

    let record = outcome?;
    Ok((StatusCode::ACCEPTED, Json(RunView::from_record(&record))))
}
