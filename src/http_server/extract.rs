//! Credential and client extraction from request headers.

use axum::http::HeaderMap;

use super::errors::{api_error, ApiResult};
use super::server::AppState;
use crate::audit::ClientInfo;
use crate::errors::GateError;
use crate::principal::Principal;

pub const EDGE_TOKEN_HEADER: &str = "x-edge-token";

/// Extract Bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Verify the operator bearer token
pub fn require_principal(state: &AppState, headers: &HeaderMap) -> ApiResult<Principal> {
    let token = extract_bearer_token(headers).ok_or_else(|| api_error(GateError::MissingCredential))?;
    state.token_verifier.verify(token).map_err(api_error)
}

/// Raw edge agent token
pub fn require_edge_token(headers: &HeaderMap) -> ApiResult<&str> {
    headers
        .get(EDGE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| api_error(GateError::InvalidEdgeToken))
}

/// Client address (first `x-forwarded-for` hop) and user agent
pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    ClientInfo {
        ip_address: header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|ip| ip.trim().to_string())
            .or_else(|| header("x-real-ip").map(String::from)),
        user_agent: header("user-agent").map(String::from),
    }
}
