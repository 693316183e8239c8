//! RS256 signer (controller) and verifier (agent).

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::Value;

use super::claims::{format_expiry, JobClaims};
use super::SignatureError;
use crate::errors::{GateError, GateResult};

const ALGORITHM: Algorithm = Algorithm::RS256;

/// Controller-side job signer holding the private key
#[derive(Clone)]
pub struct JobSigner {
    key: EncodingKey,
}

impl JobSigner {
    /// Load an RSA private key (PKCS#1 or PKCS#8 PEM)
    pub fn from_pem(pem: &[u8]) -> Result<Self, SignatureError> {
        let key = EncodingKey::from_rsa_pem(pem).map_err(|_| SignatureError::KeyInvalid)?;
        Ok(Self { key })
    }

    /// Sign a job ticket
    pub fn sign(
        &self,
        edge_node_id: &str,
        job_type: &str,
        payload: &Value,
        nonce: &str,
        expires_at: DateTime<Utc>,
    ) -> GateResult<String> {
        let claims = JobClaims {
            edge_node_id: edge_node_id.to_string(),
            job_type: job_type.to_string(),
            nonce: nonce.to_string(),
            expires_at: format_expiry(expires_at),
            payload: payload.clone(),
            exp: ceil_seconds(expires_at),
        };

        encode(&Header::new(ALGORITHM), &claims, &self.key).map_err(|e| {
            tracing::error!(error = %e, "job signing failed");
            GateError::SigningFailed
        })
    }
}

fn ceil_seconds(at: DateTime<Utc>) -> i64 {
    if at.timestamp_subsec_nanos() > 0 {
        at.timestamp() + 1
    } else {
        at.timestamp()
    }
}

/// Agent-side verifier holding the controller's public key
#[derive(Clone)]
pub struct JobVerifier {
    key: DecodingKey,
}

impl JobVerifier {
    /// Load an RSA public key (SPKI or PKCS#1 PEM)
    pub fn from_pem(pem: &[u8]) -> Result<Self, SignatureError> {
        let key = DecodingKey::from_rsa_pem(pem).map_err(|_| SignatureError::KeyInvalid)?;
        Ok(Self { key })
    }

    /// Verify a ticket against the current time
    pub fn verify(&self, token: &str) -> Result<JobClaims, SignatureError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a ticket; `now` drives the explicit `expiresAt` check
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<JobClaims, SignatureError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;

        let data = decode::<JobClaims>(token, &self.key, &validation).map_err(|e| match e.kind() {
            JwtErrorKind::ExpiredSignature => SignatureError::Expired,
            JwtErrorKind::InvalidSignature | JwtErrorKind::InvalidAlgorithm => {
                SignatureError::BadSignature
            }
            JwtErrorKind::InvalidRsaKey(_) | JwtErrorKind::InvalidKeyFormat => {
                SignatureError::KeyInvalid
            }
            _ => SignatureError::Malformed,
        })?;

        let claims = data.claims;
        let expires_at = claims.expires_at_time().ok_or(SignatureError::Malformed)?;
        if expires_at <= now {
            return Err(SignatureError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use chrono::Duration;
    use serde_json::json;

    const PRIVATE_PEM: &str = include_str!("../../tests/fixtures/job_signing_private.pem");
    const PUBLIC_PEM: &str = include_str!("../../tests/fixtures/job_signing_public.pem");
    const ROGUE_PRIVATE_PEM: &str = include_str!("../../tests/fixtures/rogue_private.pem");

    fn signer() -> JobSigner {
        JobSigner::from_pem(PRIVATE_PEM.as_bytes()).unwrap()
    }

    fn verifier() -> JobVerifier {
        JobVerifier::from_pem(PUBLIC_PEM.as_bytes()).unwrap()
    }

    fn payload() -> Value {
        json!({
            "templateId": "show_interfaces",
            "params": {"iface": "Gi0/1"},
            "riskLevel": "R0_READ",
            "target": {"ip": "10.0.0.5"},
        })
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let expires_at = Utc::now() + Duration::seconds(60);
        let token = signer()
            .sign("edge-1", "netops.command", &payload(), "00ff", expires_at)
            .unwrap();

        let claims = verifier().verify(&token).unwrap();
        assert_eq!(claims.edge_node_id, "edge-1");
        assert_eq!(claims.job_type, "netops.command");
        assert_eq!(claims.nonce, "00ff");
        assert_eq!(claims.expires_at, format_expiry(expires_at));
        assert_eq!(claims.payload, payload());
    }

    #[test]
    fn test_expired_ticket_rejected() {
        let token = signer()
            .sign("edge-1", "netops.command", &payload(), "00ff", Utc::now() - Duration::seconds(5))
            .unwrap();
        assert_eq!(verifier().verify(&token), Err(SignatureError::Expired));
    }

    #[test]
    fn test_expiry_checked_against_supplied_clock() {
        let expires_at = Utc::now() + Duration::seconds(60);
        let token = signer()
            .sign("edge-1", "netops.command", &payload(), "00ff", expires_at)
            .unwrap();

        assert_eq!(
            verifier().verify_at(&token, expires_at),
            Err(SignatureError::Expired)
        );
        assert!(verifier()
            .verify_at(&token, expires_at - Duration::seconds(1))
            .is_ok());
    }

    #[test]
    fn test_foreign_key_rejected() {
        let rogue = JobSigner::from_pem(ROGUE_PRIVATE_PEM.as_bytes()).unwrap();
        let token = rogue
            .sign("edge-1", "netops.command", &payload(), "00ff", Utc::now() + Duration::seconds(60))
            .unwrap();
        assert_eq!(verifier().verify(&token), Err(SignatureError::BadSignature));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let token = signer()
            .sign("edge-1", "netops.command", &payload(), "00ff", Utc::now() + Duration::seconds(60))
            .unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let mut claims: Value = serde_json::from_slice(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD
                .decode(parts[1])
                .unwrap(),
        )
        .unwrap();
        claims["edgeNodeId"] = json!("edge-2");
        let forged_body = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(&claims).unwrap());

        let forged = format!("{}.{}.{}", parts[0], forged_body, parts[2]);
        assert_eq!(verifier().verify(&forged), Err(SignatureError::BadSignature));
    }

    #[test]
    fn test_hs256_downgrade_rejected() {
        let claims = JobClaims {
            edge_node_id: "edge-1".to_string(),
            job_type: "netops.command".to_string(),
            nonce: "00ff".to_string(),
            expires_at: format_expiry(Utc::now() + Duration::seconds(60)),
            payload: payload(),
            exp: (Utc::now() + Duration::seconds(60)).timestamp(),
        };
        // HMAC keyed with the public key bytes
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(PUBLIC_PEM.as_bytes()),
        )
        .unwrap();
        assert_eq!(verifier().verify(&token), Err(SignatureError::BadSignature));
    }

    #[test]
    fn test_unsigned_token_rejected() {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let header = engine.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let body = engine.encode(br#"{"edgeNodeId":"edge-1"}"#);
        let token = format!("{header}.{body}.");
        assert!(verifier().verify(&token).is_err());
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert_eq!(verifier().verify("not-a-token"), Err(SignatureError::Malformed));
    }

    #[test]
    fn test_bad_key_material() {
        assert!(matches!(
            JobSigner::from_pem(b"not a key"),
            Err(SignatureError::KeyInvalid)
        ));
        assert!(matches!(
            JobVerifier::from_pem(b"not a key"),
            Err(SignatureError::KeyInvalid)
        ));
    }
}
