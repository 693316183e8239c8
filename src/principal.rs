//! # Principals
//!
//! Operator identity as consumed by the gate: a bearer token verifies to a
//! `{user_id, role}` pair, and the role carries a fixed permission set.
//!
//! Token issuance is not this crate's job. [`JwtTokenVerifier`] accepts
//! HS256 tokens minted by the identity service; `issue` exists for local
//! tooling and tests.

use std::fmt;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::{GateError, GateResult};

pub const PERM_READ: &str = "netops.read";
pub const PERM_BACKUP: &str = "netops.backup";
pub const PERM_CHANGE_REQUEST: &str = "netops.change.request";
pub const PERM_CHANGE_APPROVE: &str = "netops.change.approve";
pub const PERM_CHANGE_EXECUTE: &str = "netops.change.execute";
pub const PERM_CHANGE_ROLLBACK: &str = "netops.change.rollback";

/// Operator role, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Viewer,
    Netops,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Netops => "netops",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Unknown role names map to `viewer`
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "netops" => Role::Netops,
            "admin" => Role::Admin,
            "super_admin" => Role::SuperAdmin,
            _ => Role::Viewer,
        }
    }

    pub fn permissions(&self) -> &'static [&'static str] {
        match self {
            Role::Viewer => &[PERM_READ],
            Role::Netops => &[PERM_READ, PERM_BACKUP, PERM_CHANGE_REQUEST, PERM_CHANGE_EXECUTE],
            Role::Admin => &[
                PERM_READ,
                PERM_BACKUP,
                PERM_CHANGE_REQUEST,
                PERM_CHANGE_APPROVE,
                PERM_CHANGE_EXECUTE,
                PERM_CHANGE_ROLLBACK,
            ],
            Role::SuperAdmin => &[
                PERM_READ,
                PERM_BACKUP,
                PERM_CHANGE_REQUEST,
                PERM_CHANGE_APPROVE,
                PERM_CHANGE_EXECUTE,
                PERM_CHANGE_ROLLBACK,
            ],
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions().contains(&permission)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// Break-glass is honoured only for the top role
    pub fn break_glass_allowed(&self) -> bool {
        self.role == Role::SuperAdmin
    }

    pub fn require_permission(&self, permission: &str) -> GateResult<()> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            Err(GateError::PermissionDenied(permission.to_string()))
        }
    }

    pub fn require_role(&self, minimum: Role) -> GateResult<()> {
        if self.role >= minimum {
            Ok(())
        } else {
            Err(GateError::PermissionDenied(format!("role {minimum} required")))
        }
    }
}

/// Opaque "verify token -> principal" capability
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> GateResult<Principal>;
}

/// Operator token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorClaims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
    pub iss: String,
}

/// Operator token settings
#[derive(Debug, Clone)]
pub struct JwtVerifierConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

impl Default for JwtVerifierConfig {
    fn default() -> Self {
        Self {
            secret: "CHANGE_THIS_SECRET_IN_PRODUCTION".to_string(),
            issuer: "netops".to_string(),
            audience: "netops-gate".to_string(),
        }
    }
}

/// HS256 operator token verifier
#[derive(Clone)]
pub struct JwtTokenVerifier {
    config: JwtVerifierConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtTokenVerifier {
    pub fn new(config: JwtVerifierConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Mint a token for `user_id` with `role`
    pub fn issue(&self, user_id: &str, role: Role, ttl: Duration) -> GateResult<String> {
        let now = Utc::now();
        let claims = OperatorClaims {
            sub: user_id.to_string(),
            role: role.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            aud: self.config.audience.clone(),
            iss: self.config.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| GateError::SigningFailed)
    }
}

impl TokenVerifier for JwtTokenVerifier {
    fn verify(&self, token: &str) -> GateResult<Principal> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.config.audience]);
        validation.set_issuer(&[&self.config.issuer]);

        let data = decode::<OperatorClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| GateError::InvalidToken)?;

        if data.claims.sub.trim().is_empty() {
            return Err(GateError::InvalidToken);
        }

        Ok(Principal::new(data.claims.sub, Role::parse(&data.claims.role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> JwtTokenVerifier {
        JwtTokenVerifier::new(JwtVerifierConfig {
            secret: "test_secret_key_for_testing_only".to_string(),
            ..JwtVerifierConfig::default()
        })
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(Role::parse("SUPER_ADMIN"), Role::SuperAdmin);
        assert_eq!(Role::parse("netops"), Role::Netops);
        assert_eq!(Role::parse("root"), Role::Viewer);
        assert_eq!(Role::parse(""), Role::Viewer);
    }

    #[test]
    fn test_permissions() {
        assert!(Role::SuperAdmin.has_permission(PERM_CHANGE_APPROVE));
        assert!(Role::Netops.has_permission(PERM_CHANGE_EXECUTE));
        assert!(!Role::Netops.has_permission(PERM_CHANGE_APPROVE));
        assert!(!Role::Viewer.has_permission(PERM_CHANGE_EXECUTE));

        let viewer = Principal::new("u1", Role::Viewer);
        assert!(matches!(
            viewer.require_permission(PERM_CHANGE_EXECUTE),
            Err(GateError::PermissionDenied(_))
        ));
        assert!(viewer.require_role(Role::Admin).is_err());
        assert!(Principal::new("u2", Role::SuperAdmin).require_role(Role::Admin).is_ok());
    }

    #[test]
    fn test_break_glass_only_for_super_admin() {
        assert!(Principal::new("u", Role::SuperAdmin).break_glass_allowed());
        assert!(!Principal::new("u", Role::Admin).break_glass_allowed());
    }

    #[test]
    fn test_issue_and_verify() {
        let verifier = verifier();
        let token = verifier.issue("user-7", Role::Admin, Duration::minutes(5)).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let principal = verifier.verify(&token).unwrap();
        assert_eq!(principal, Principal::new("user-7", Role::Admin));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other = JwtTokenVerifier::new(JwtVerifierConfig {
            secret: "another_secret".to_string(),
            ..JwtVerifierConfig::default()
        });
        let token = other.issue("user-7", Role::Admin, Duration::minutes(5)).unwrap();
        assert!(matches!(verifier().verify(&token), Err(GateError::InvalidToken)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = verifier();
        let token = verifier.issue("user-7", Role::Admin, Duration::hours(-1)).unwrap();
        assert!(matches!(verifier.verify(&token), Err(GateError::InvalidToken)));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            verifier().verify("invalid.token.here"),
            Err(GateError::InvalidToken)
        ));
    }
}
