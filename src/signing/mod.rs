//! # Job Signing
//!
//! Controller-issued job tickets: an RS256 JWT over
//! `{edgeNodeId, jobType, nonce, expiresAt, payload}`.
//!
//! ## Invariants
//! - The algorithm is fixed to RS256 at both ends; tokens declaring any other
//!   algorithm (HS256, `none`) never verify
//! - A valid signature is not sufficient: the verified claims must also bind
//!   to the independently fetched job row (see [`check_binding`])
//! - `expiresAt <= now` is rejected even when the signature is valid

mod claims;
mod signer;

use thiserror::Error;

pub use claims::{check_binding, format_expiry, BindingMismatch, JobClaims, SignedJob};
pub use signer::{JobSigner, JobVerifier};

/// Ticket verification failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Not a decodable RS256 token, or claims missing/ill-typed
    #[error("Malformed job signature")]
    Malformed,

    /// Signature does not verify under the configured public key
    #[error("Invalid job signature")]
    BadSignature,

    /// Ticket is past its expiry
    #[error("Job expired")]
    Expired,

    /// Configured key could not be parsed
    #[error("Job signing key invalid")]
    KeyInvalid,
}
