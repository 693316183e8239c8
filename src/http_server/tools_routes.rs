//! Config push endpoint.

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};

use super::errors::{api_error, ApiResult};
use super::extract::{client_info, require_principal};
use super::server::AppState;
use crate::gateway::{ConfigPushOutcome, ConfigPushRequest};

async fn config_push_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ConfigPushRequest>,
) -> ApiResult<Json<ConfigPushOutcome>> {
    let principal = require_principal(&state, &headers)?;
    let outcome = state
        .gateway
        .push_config(&principal, &client_info(&headers), request)
        .map_err(api_error)?;
    Ok(Json(outcome))
}

pub fn tools_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/config/push", post(config_push_handler))
        .with_state(state)
}
