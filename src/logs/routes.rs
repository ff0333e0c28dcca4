//! REST endpoints for daily logs.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use super::model::{DailyLog, LogAction, LogData, LogPatch};
use super::service::LogService;
use crate::auth::model::{Identity, Session};
use crate::error::LogError;

type Reply = (StatusCode, Json<Value>);

/// Build the router for `/api/logs`. Expects a [`Session`] extension on
/// every request.
pub fn log_routes(service: Arc<LogService>) -> Router {
    Router::new()
        .route("/api/logs", get(list_logs))
        .route("/api/logs/today", get(today_log))
        .route(
            "/api/logs/{id}",
            get(get_log).put(replace_log).patch(patch_log),
        )
        .route("/api/logs/{id}/actions", post(apply_action))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
struct ReplaceRequest {
    log_data: LogData,
    #[serde(default)]
    expected_revision: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PatchRequest {
    #[serde(flatten)]
    patch: LogPatch,
    #[serde(default)]
    expected_revision: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ActionRequest {
    #[serde(flatten)]
    action: LogAction,
    #[serde(default)]
    expected_revision: Option<i64>,
}

fn error(status: StatusCode, message: impl Into<String>) -> Reply {
    (status, Json(json!({ "error": message.into() })))
}

/// Map a service error to its HTTP status.
fn log_error_reply(e: &LogError) -> Reply {
    match e {
        LogError::NotAuthenticated => error(StatusCode::UNAUTHORIZED, e.to_string()),
        LogError::NotFound { .. } => error(StatusCode::NOT_FOUND, "Log not found"),
        LogError::Conflict { actual, .. } => (
            StatusCode::CONFLICT,
            Json(json!({ "error": e.to_string(), "revision": actual })),
        ),
        LogError::Store(_) => error(StatusCode::SERVICE_UNAVAILABLE, "Log store unavailable"),
    }
}

fn ok(log: &DailyLog) -> Reply {
    (StatusCode::OK, Json(json!(log)))
}

fn require_user(session: &Session) -> Result<&Identity, Reply> {
    session
        .identity()
        .ok_or_else(|| log_error_reply(&LogError::NotAuthenticated))
}

fn parse_id(id: &str) -> Result<Uuid, Reply> {
    Uuid::parse_str(id).map_err(|_| error(StatusCode::BAD_REQUEST, "Invalid log ID"))
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Reply> {
    body.map(|Json(v)| v).map_err(|e| {
        debug!(error = %e, "Rejected log request body");
        error(StatusCode::BAD_REQUEST, e.body_text())
    })
}

/// Fetch a log and check it belongs to the caller. Other users' logs are
/// reported as missing.
async fn owned_log(service: &LogService, user: &Identity, id: Uuid) -> Result<DailyLog, Reply> {
    match service.get_log(id).await {
        Ok(Some(log)) if log.user_id == user.id => Ok(log),
        Ok(_) => Err(log_error_reply(&LogError::NotFound { id })),
        Err(e) => Err(log_error_reply(&e)),
    }
}

async fn today_log(
    State(service): State<Arc<LogService>>,
    Extension(session): Extension<Session>,
) -> Result<Reply, Reply> {
    match service.get_or_create_today(&session).await {
        Ok(Some(log)) => Ok(ok(&log)),
        Ok(None) => Err(log_error_reply(&LogError::NotAuthenticated)),
        Err(e) => Err(log_error_reply(&e)),
    }
}

async fn list_logs(
    State(service): State<Arc<LogService>>,
    Extension(session): Extension<Session>,
) -> Result<Reply, Reply> {
    let summaries = service
        .list_history(&session)
        .await
        .map_err(|e| log_error_reply(&e))?;
    Ok((StatusCode::OK, Json(json!(summaries))))
}

async fn get_log(
    State(service): State<Arc<LogService>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Reply, Reply> {
    let user = require_user(&session)?;
    let id = parse_id(&id)?;
    let log = owned_log(&service, user, id).await?;
    Ok(ok(&log))
}

async fn replace_log(
    State(service): State<Arc<LogService>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    body: Result<Json<ReplaceRequest>, JsonRejection>,
) -> Result<Reply, Reply> {
    let user = require_user(&session)?;
    let id = parse_id(&id)?;
    let req = parse_body(body)?;
    owned_log(&service, user, id).await?;

    let log = service
        .update_log(id, req.log_data, req.expected_revision)
        .await
        .map_err(|e| log_error_reply(&e))?;
    Ok(ok(&log))
}

async fn patch_log(
    State(service): State<Arc<LogService>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    body: Result<Json<PatchRequest>, JsonRejection>,
) -> Result<Reply, Reply> {
    let user = require_user(&session)?;
    let id = parse_id(&id)?;
    let req = parse_body(body)?;
    owned_log(&service, user, id).await?;

    let log = service
        .patch_log(id, req.patch, req.expected_revision)
        .await
        .map_err(|e| log_error_reply(&e))?;
    Ok(ok(&log))
}

async fn apply_action(
    State(service): State<Arc<LogService>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    body: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Reply, Reply> {
    let user = require_user(&session)?;
    let id = parse_id(&id)?;
    let req = parse_body(body)?;
    owned_log(&service, user, id).await?;

    let log = service
        .apply_action(id, req.action, req.expected_revision)
        .await
        .map_err(|e| log_error_reply(&e))?;
    Ok(ok(&log))
}
