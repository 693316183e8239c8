//! Ticket claims and job binding.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Claims carried by a job ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobClaims {
    pub edge_node_id: String,
    pub job_type: String,
    pub nonce: String,
    /// ISO-8601 with millisecond precision, byte-compared on binding
    pub expires_at: String,
    pub payload: Value,
    /// Registered JWT expiry, seconds, rounded up from `expires_at`
    pub exp: i64,
}

impl JobClaims {
    pub fn expires_at_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.expires_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// The stored job fields a ticket must bind to
#[derive(Debug, Clone, Copy)]
pub struct SignedJob<'a> {
    pub edge_node_id: &'a str,
    pub job_type: &'a str,
    pub nonce: &'a str,
    pub expires_at: &'a str,
    pub payload: &'a Value,
}

/// Which bound field disagreed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingMismatch {
    Edge,
    JobType,
    Nonce,
    Expiry,
    Payload,
}

impl fmt::Display for BindingMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingMismatch::Edge => write!(f, "Edge mismatch"),
            BindingMismatch::JobType | BindingMismatch::Nonce | BindingMismatch::Payload => {
                write!(f, "Job payload mismatch")
            }
            BindingMismatch::Expiry => write!(f, "Expiry mismatch"),
        }
    }
}

impl std::error::Error for BindingMismatch {}

/// Compare verified claims against the stored job.
///
/// Payloads are compared structurally, so key order in the stored JSON does
/// not matter but any added, removed or changed value does.
pub fn check_binding(claims: &JobClaims, job: &SignedJob<'_>) -> Result<(), BindingMismatch> {
    if claims.edge_node_id != job.edge_node_id {
        return Err(BindingMismatch::Edge);
    }
    if claims.job_type != job.job_type {
        return Err(BindingMismatch::JobType);
    }
    if claims.nonce != job.nonce {
        return Err(BindingMismatch::Nonce);
    }
    if claims.expires_at != job.expires_at {
        return Err(BindingMismatch::Expiry);
    }
    if &claims.payload != job.payload {
        return Err(BindingMismatch::Payload);
    }
    Ok(())
}

/// Canonical expiry string used in claims and job rows
pub fn format_expiry(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
