//! HTTP error mapping.

use axum::{http::StatusCode, Json};
use serde::Serialize;

use crate::errors::GateError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl From<&GateError> for ErrorResponse {
    fn from(err: &GateError) -> Self {
        Self {
            error: err.to_string(),
            code: err.status_code(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type ApiResult<T> = Result<T, ApiError>;

/// Map a gate error onto its HTTP status and JSON body
pub fn api_error(err: GateError) -> ApiError {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if err.is_client_error() {
        tracing::debug!(status = status.as_u16(), error = %err, "request rejected");
    } else {
        tracing::error!(status = status.as_u16(), error = %err, "request failed");
    }
    (status, Json(ErrorResponse::from(&err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status() {
        let (status, Json(body)) = api_error(GateError::AllowlistEmpty);
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, 403);
        assert_eq!(body.error, "Forbidden: allowlist is empty");

        let (status, _) = api_error(GateError::PairingInvalidOrUsed);
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
