//! # SSH Routes
//!
//! Session lifecycle, session logs and templated command execution.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::errors::{api_error, ApiResult};
use super::extract::{client_info, require_principal};
use super::server::AppState;
use crate::gateway::{CommandOutcome, OpenSession, SessionLogEvent, SshCommandRequest, SshSession};
use crate::principal::PERM_READ;

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SshSession>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLogResponse {
    pub session_id: String,
    pub events: Vec<SessionLogEvent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub format: Option<String>,
}

async fn list_sessions_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<SessionsResponse>> {
    let principal = require_principal(&state, &headers)?;
    principal.require_permission(PERM_READ).map_err(api_error)?;

    let sessions = state.gateway.list_sessions().map_err(api_error)?;
    Ok(Json(SessionsResponse { sessions }))
}

async fn open_session_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<OpenSession>,
) -> ApiResult<(StatusCode, Json<SshSession>)> {
    let principal = require_principal(&state, &headers)?;
    let session = state
        .gateway
        .open_session(&principal, &client_info(&headers), request)
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn close_session_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<SshSession>> {
    let principal = require_principal(&state, &headers)?;
    let session = state
        .gateway
        .close_session(&principal, &client_info(&headers), &id)
        .map_err(api_error)?;
    Ok(Json(session))
}

/// JSON by default; `?format=text` exports plain text
async fn session_log_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Response> {
    let principal = require_principal(&state, &headers)?;
    principal.require_permission(PERM_READ).map_err(api_error)?;

    let sessions = state.gateway.sessions();
    if query.format.as_deref() == Some("text") {
        let text = sessions.export_text(&id).map_err(api_error)?;
        return Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response());
    }

    let events = sessions.log(&id).map_err(api_error)?;
    Ok(Json(SessionLogResponse {
        session_id: id,
        events,
    })
    .into_response())
}

async fn run_command_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<SshCommandRequest>,
) -> ApiResult<Json<CommandOutcome>> {
    let principal = require_principal(&state, &headers)?;
    let outcome = state
        .gateway
        .run_ssh_command(&principal, &client_info(&headers), &id, request)
        .map_err(api_error)?;
    Ok(Json(outcome))
}

pub fn ssh_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sessions", get(list_sessions_handler).post(open_session_handler))
        .route("/sessions/:id", delete(close_session_handler))
        .route("/sessions/:id/log", get(session_log_handler))
        .route("/sessions/:id/command", post(run_command_handler))
        .with_state(state)
}
