//! # Gate Errors
//!
//! Error taxonomy shared by the command gateway, the job protocol and the
//! HTTP surface.
//!
//! Change-control violations are denials (403), not malformed requests.

use thiserror::Error;

/// Result type for gate operations
pub type GateResult<T> = Result<T, GateError>;

/// Coarse error class, one per HTTP failure family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    BadRequest,
    Conflict,
    NotFound,
    ServiceUnavailable,
    Internal,
}

/// Gate errors
#[derive(Debug, Clone, Error)]
pub enum GateError {
    // ==================
    // Credential Errors
    // ==================

    /// Missing or malformed bearer credential
    #[error("Missing or invalid authorization header")]
    MissingCredential,

    /// Bearer token did not verify
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Edge token does not belong to a paired edge node
    #[error("Edge token invalid")]
    InvalidEdgeToken,

    // ==================
    // Change-Control Errors
    // ==================

    /// Write-risk action without a reason
    #[error("Reason is required for write actions")]
    ReasonRequired,

    /// Write-risk action without a change request
    #[error("Change request ID is required for write actions")]
    ChangeRequestRequired,

    /// Change-risk action without approval or honoured break-glass
    #[error("Approval is required before executing this action")]
    ApprovalRequired,

    /// Maintenance window required but absent or inactive
    #[error("Maintenance window is required for this action")]
    MaintenanceWindowRequired,

    /// Dangerous action without a rollback plan
    #[error("Rollback plan is required for R3 actions")]
    RollbackPlanRequired,

    // ==================
    // Policy Errors
    // ==================

    /// The resolved policy grants nothing
    #[error("Forbidden: allowlist is empty")]
    AllowlistEmpty,

    /// Command failed the allow-list or matched a deny rule
    #[error("Command blocked by policy: {0}")]
    CommandBlocked(String),

    /// Role lacks the required permission
    #[error("Insufficient permissions: {0}")]
    PermissionDenied(String),

    // ==================
    // Request Errors
    // ==================

    /// Raw command smuggled into a job payload
    #[error("Raw commands are not allowed; use templateId + params")]
    RawCommandRejected,

    /// Template id not in the catalog
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    /// Generic malformed request
    #[error("Bad request: {0}")]
    BadRequest(String),

    // ==================
    // Pairing Errors
    // ==================

    /// Pairing code missing or already consumed
    #[error("Pairing code invalid or already used")]
    PairingInvalidOrUsed,

    /// Pairing code past its TTL
    #[error("Pairing code expired")]
    PairingExpired,

    /// Write-once record written twice
    #[error("Conflict: {0}")]
    Conflict(String),

    // ==================
    // Lookup Errors
    // ==================

    #[error("Not found: {0}")]
    NotFound(String),

    // ==================
    // Downstream / Internal Errors
    // ==================

    /// Device transport or controller unreachable
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Signing key unusable or signing failed
    #[error("Internal error: job signing failed")]
    SigningFailed,

    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl GateError {
    /// Returns the taxonomy class for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GateError::MissingCredential
            | GateError::InvalidToken
            | GateError::InvalidEdgeToken => ErrorKind::Unauthorized,

            GateError::ReasonRequired
            | GateError::ChangeRequestRequired
            | GateError::ApprovalRequired
            | GateError::MaintenanceWindowRequired
            | GateError::RollbackPlanRequired
            | GateError::AllowlistEmpty
            | GateError::CommandBlocked(_)
            | GateError::PermissionDenied(_) => ErrorKind::Forbidden,

            GateError::RawCommandRejected
            | GateError::UnknownTemplate(_)
            | GateError::BadRequest(_)
            | GateError::PairingExpired => ErrorKind::BadRequest,

            GateError::PairingInvalidOrUsed | GateError::Conflict(_) => ErrorKind::Conflict,

            GateError::NotFound(_) => ErrorKind::NotFound,

            GateError::Unavailable(_) => ErrorKind::ServiceUnavailable,

            GateError::SigningFailed | GateError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::ServiceUnavailable => 503,
            ErrorKind::Internal => 500,
        }
    }

    /// True for change-control gate denials
    pub fn is_change_control(&self) -> bool {
        matches!(
            self,
            GateError::ReasonRequired
                | GateError::ChangeRequestRequired
                | GateError::ApprovalRequired
                | GateError::MaintenanceWindowRequired
                | GateError::RollbackPlanRequired
        )
    }

    /// Returns whether this error should be logged at warn level
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    pub(crate) fn lock_poisoned() -> Self {
        GateError::Storage("Lock poisoned".to_string())
    }
}
