//! # Edge Registry
//!
//! Pairing-code issuance and consumption, edge node identity and the
//! per-edge policy bundle.
//!
//! ## Invariants
//! - A pairing code is consumed at most once, and only before it expires
//! - Consuming the code and creating the edge node happen together or not
//!   at all
//! - Each successful pairing creates a new independent edge node
//! - The bearer token is returned once; only its hash is stored

pub mod allowlist;
mod repository;
mod types;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::crypto::{generate_token, hash_token, random_hex};
use crate::errors::{GateError, GateResult};

pub use allowlist::is_allowed_target;
pub use repository::{EdgeRepository, InMemoryEdgeRepository};
pub use types::{
    EdgeNode, NewEdgeNode, PairResponse, PairingCode, PairingCodeResponse, PolicyBundle,
};

pub const DEFAULT_PAIRING_TTL_MINUTES: i64 = 10;
/// Longest pairing-code lifetime (one week)
pub const MAX_PAIRING_TTL_MINUTES: i64 = 7 * 24 * 60;
/// Expired codes are kept this long so late attempts still report expiry
pub const PAIRING_CODE_RETENTION_HOURS: i64 = 24;

/// Edge registry service
pub struct EdgeRegistry {
    repository: Arc<dyn EdgeRepository>,
    default_ttl: Duration,
}

impl EdgeRegistry {
    pub fn new(repository: Arc<dyn EdgeRepository>) -> Self {
        Self {
            repository,
            default_ttl: Duration::minutes(DEFAULT_PAIRING_TTL_MINUTES),
        }
    }

    /// Clamped to `1..=MAX_PAIRING_TTL_MINUTES`
    pub fn with_default_ttl(mut self, minutes: i64) -> Self {
        self.default_ttl = Duration::minutes(minutes.clamp(1, MAX_PAIRING_TTL_MINUTES));
        self
    }

    pub fn repository(&self) -> &Arc<dyn EdgeRepository> {
        &self.repository
    }

    /// Issue an 8-character uppercase hex pairing code
    pub fn create_pairing_code(
        &self,
        tenant_id: &str,
        ttl_minutes: Option<i64>,
    ) -> GateResult<PairingCodeResponse> {
        let code = random_hex(4).to_uppercase();
        self.issue_pairing_code(tenant_id, &code, ttl_minutes, Utc::now())
    }

    /// Register a specific code issued at `now`
    pub fn issue_pairing_code(
        &self,
        tenant_id: &str,
        code: &str,
        ttl_minutes: Option<i64>,
        now: DateTime<Utc>,
    ) -> GateResult<PairingCodeResponse> {
        if tenant_id.trim().is_empty() {
            return Err(GateError::BadRequest("tenantId is required".to_string()));
        }
        let ttl = match ttl_minutes {
            Some(minutes) if minutes <= 0 => {
                return Err(GateError::BadRequest("ttlMinutes must be positive".to_string()))
            }
            Some(minutes) if minutes > MAX_PAIRING_TTL_MINUTES => {
                return Err(GateError::BadRequest(format!(
                    "ttlMinutes must be at most {MAX_PAIRING_TTL_MINUTES}"
                )))
            }
            Some(minutes) => Duration::minutes(minutes),
            None => self.default_ttl,
        };

        let expires_at = now + ttl;
        self.repository
            .insert_pairing_code(PairingCode::new(tenant_id, code, now, expires_at))?;

        tracing::info!(tenant_id, expires_at = %expires_at, "pairing code issued");

        Ok(PairingCodeResponse {
            pairing_code: code.to_string(),
            expires_at,
        })
    }

    pub fn pair_edge(
        &self,
        code: &str,
        instance_fingerprint: Option<&str>,
        name: &str,
    ) -> GateResult<PairResponse> {
        self.pair_edge_at(code, instance_fingerprint, name, Utc::now())
    }

    /// Consume `code` at `now` and register a new edge node
    pub fn pair_edge_at(
        &self,
        code: &str,
        instance_fingerprint: Option<&str>,
        name: &str,
        now: DateTime<Utc>,
    ) -> GateResult<PairResponse> {
        let code = code.trim();
        if code.is_empty() {
            return Err(GateError::BadRequest("pairingCode is required".to_string()));
        }
        if name.trim().is_empty() {
            return Err(GateError::BadRequest("name is required".to_string()));
        }

        let auth_token = generate_token();
        let node = NewEdgeNode {
            name: name.trim().to_string(),
            instance_fingerprint: instance_fingerprint.unwrap_or_default().to_string(),
            auth_token_hash: hash_token(&auth_token),
            policy_bundle: PolicyBundle::default(),
        };

        let edge = self
            .repository
            .consume_and_create(code, now, node)
            .inspect_err(|e| tracing::warn!(error = %e, "pairing rejected"))?;

        tracing::info!(edge_id = %edge.id, tenant_id = %edge.tenant_id, "edge paired");

        Ok(PairResponse {
            edge_id: edge.id,
            auth_token,
            policy_bundle: edge.policy_bundle,
        })
    }

    pub fn purge_expired_codes(&self) -> GateResult<usize> {
        self.purge_expired_codes_at(Utc::now())
    }

    /// Forget codes that expired more than the retention period before `now`
    pub fn purge_expired_codes_at(&self, now: DateTime<Utc>) -> GateResult<usize> {
        self.repository
            .purge_pairing_codes(now - Duration::hours(PAIRING_CODE_RETENTION_HOURS))
    }

    /// Resolve an edge bearer token to its node
    pub fn authenticate(&self, token: &str) -> GateResult<EdgeNode> {
        if token.trim().is_empty() {
            return Err(GateError::InvalidEdgeToken);
        }
        self.repository
            .find_by_token_hash(&hash_token(token.trim()))?
            .ok_or(GateError::InvalidEdgeToken)
    }

    pub fn get(&self, edge_id: &str) -> GateResult<EdgeNode> {
        self.repository
            .get_node(edge_id)?
            .ok_or_else(|| GateError::NotFound(format!("edge node {edge_id}")))
    }
}
