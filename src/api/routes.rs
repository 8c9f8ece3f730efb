//! API route definitions.

use super::state::AppState;
use crate::storage::{runs, schedules};
use crate::trend;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Header carrying the shared trigger secret.
pub const TRIGGER_SECRET_HEADER: &str = "x-trigger-secret";

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/batch/run", post(run_batch))
        .route("/schedules", get(list_schedules))
        .route("/schedules/{id}/scan", post(manual_scan))
        .route("/schedules/{id}/runs", get(schedule_runs))
        .route("/schedules/{id}/trends", get(schedule_trends))
        .route("/alerts", get(list_alerts))
        .route("/alerts/{id}/resolve", post(resolve_alert))
        .route("/trends/ranking", get(trend_ranking))
}

fn fail(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.into() })))
}

fn internal(e: anyhow::Error) -> (StatusCode, Json<Value>) {
    tracing::error!("API handler error: {e:#}");
    fail(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

fn envelope(data: Value) -> Json<Value> {
    Json(json!({
        "data": data,
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

/// Mutating endpoints require the shared secret header.
fn require_secret(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    let Some(expected) = state.trigger_secret.as_deref() else {
        return Err(fail(
            StatusCode::SERVICE_UNAVAILABLE,
            "trigger secret not configured",
        ));
    };
    let provided = headers
        .get(TRIGGER_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if provided != Some(expected) {
        return Err(fail(StatusCode::UNAUTHORIZED, "invalid trigger secret"));
    }
    Ok(())
}

fn parse_id(id: &str) -> Result<Uuid, (StatusCode, Json<Value>)> {
    Uuid::parse_str(id).map_err(|_| fail(StatusCode::BAD_REQUEST, "invalid id"))
}

async fn health() -> Json<Value> {
    envelope(json!({ "status": "ok" }))
}

/// The trigger endpoint: process one bounded batch of due schedules.
async fn run_batch(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    require_secret(&state, &headers)?;
    let summary = state.runner.run_batch().await.map_err(internal)?;
    Ok(envelope(serde_json::to_value(summary).map_err(|e| internal(e.into()))?))
}

async fn list_schedules(State(state): State<AppState>) -> ApiResult {
    let list = schedules::list_schedules(&state.pool).map_err(internal)?;
    Ok(envelope(json!({
        "total": list.len(),
        "schedules": list,
    })))
}

/// Force an immediate out-of-schedule scan, bypassing due selection and
/// the idempotency claim.
async fn manual_scan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    require_secret(&state, &headers)?;
    let id = parse_id(&id)?;
    match state.runner.manual_scan(id).await.map_err(internal)? {
        Some(report) => Ok(envelope(
            serde_json::to_value(report).map_err(|e| internal(e.into()))?,
        )),
        None => Err(fail(StatusCode::NOT_FOUND, "unknown schedule")),
    }
}

#[derive(Deserialize)]
struct RunsQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

async fn schedule_runs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<RunsQuery>,
) -> ApiResult {
    let id = parse_id(&id)?;
    let runs = runs::list_runs(&state.pool, id, q.limit).map_err(internal)?;
    Ok(envelope(json!({ "total": runs.len(), "runs": runs })))
}

#[derive(Deserialize)]
struct TrendQuery {
    #[serde(default = "default_trend_days")]
    days: i64,
}

fn default_trend_days() -> i64 {
    90
}

async fn schedule_trends(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<TrendQuery>,
) -> ApiResult {
    let id = parse_id(&id)?;
    if schedules::get_schedule(&state.pool, id)
        .map_err(internal)?
        .is_none()
    {
        return Err(fail(StatusCode::NOT_FOUND, "unknown schedule"));
    }
    let report = trend::report_for_schedule(&state.pool, id, q.days).map_err(internal)?;
    Ok(envelope(json!({
        "windowDays": q.days,
        "trend": report,
    })))
}

async fn trend_ranking(State(state): State<AppState>, Query(q): Query<TrendQuery>) -> ApiResult {
    let ranking = trend::performer_ranking(&state.pool, q.days).map_err(internal)?;
    Ok(envelope(json!({
        "windowDays": q.days,
        "ranking": ranking,
    })))
}

#[derive(Deserialize)]
struct AlertsQuery {
    #[serde(default)]
    unresolved: bool,
    #[serde(default = "default_limit")]
    limit: usize,
}

async fn list_alerts(State(state): State<AppState>, Query(q): Query<AlertsQuery>) -> ApiResult {
    let alerts = state
        .runner
        .alerts()
        .list(q.unresolved, q.limit)
        .map_err(internal)?;
    Ok(envelope(json!({ "total": alerts.len(), "alerts": alerts })))
}

/// Alert resolution is an explicit action; nothing resolves automatically.
async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    require_secret(&state, &headers)?;
    let id = parse_id(&id)?;
    let resolved = state.runner.alerts().resolve(id).map_err(internal)?;
    if !resolved {
        return Err(fail(
            StatusCode::NOT_FOUND,
            "unknown or already-resolved alert",
        ));
    }
    Ok(envelope(json!({ "resolved": true })))
}
