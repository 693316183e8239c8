//! # Secret Utilities
//!
//! Random token generation, token hashing for storage and constant-time
//! comparison.
//!
//! ## Invariants
//! - Edge auth tokens are stored only as SHA-256 hashes
//! - Every secret comparison is constant-time

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Generate a 256-bit random bearer token, base64url without padding
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// Hash a token for storage using SHA-256.
///
/// The raw token is handed to the edge once at pairing; only the hash is kept.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let result = hasher.finalize();
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, result)
}

/// `len` random bytes as lowercase hex
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Constant-time comparison of two strings
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_generation() {
        let token1 = generate_token();
        let token2 = generate_token();

        assert_ne!(token1, token2);
        // base64 of 32 bytes
        assert_eq!(token1.len(), 43);
    }

    #[test]
    fn test_token_hashing() {
        let token = generate_token();
        let hash = hash_token(&token);

        assert_ne!(token, hash);
        assert_eq!(hash, hash_token(&token));
        assert_ne!(hash, hash_token("other"));
    }

    #[test]
    fn test_random_hex() {
        let nonce = random_hex(10);
        assert_eq!(nonce.len(), 20);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(nonce, random_hex(10));
    }

    #[test]
    fn test_constant_time_comparison() {
        assert!(constant_time_str_eq("edge-token", "edge-token"));
        assert!(!constant_time_str_eq("edge-token", "edge-tokem"));
        assert!(!constant_time_str_eq("edge-token", "edge-token!"));
    }
}
