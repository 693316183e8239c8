//! # Replay Guard
//!
//! Tracks consumed job nonces so each signed job runs at most once.
//!
//! ## Invariants
//! - `store` is check-and-insert under one lock: of two concurrent stores
//!   for the same nonce exactly one returns `true`
//! - Once stored, `is_used` stays true at least until the nonce's expiry
//! - Cleanup only drops entries whose expiry has passed; by then the job
//!   ticket itself fails its expiry check

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::errors::{GateError, GateResult};

/// Nonce store trait
pub trait NonceStore: Send + Sync {
    fn is_used(&self, nonce: &str) -> GateResult<bool>;

    /// Record a nonce. Returns `false` if it was already present.
    fn store(&self, nonce: &str, expires_at: DateTime<Utc>) -> GateResult<bool>;

    /// Remove nonces expired as of `now`, returning how many were dropped
    fn cleanup_at(&self, now: DateTime<Utc>) -> GateResult<usize>;

    fn cleanup(&self) -> GateResult<usize> {
        self.cleanup_at(Utc::now())
    }
}

/// In-memory nonce store
#[derive(Debug, Default)]
pub struct InMemoryNonceStore {
    nonces: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nonces.lock().map(|n| n.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NonceStore for InMemoryNonceStore {
    fn is_used(&self, nonce: &str) -> GateResult<bool> {
        let nonces = self.nonces.lock().map_err(|_| GateError::lock_poisoned())?;
        Ok(nonces.contains_key(nonce))
    }

    fn store(&self, nonce: &str, expires_at: DateTime<Utc>) -> GateResult<bool> {
        let mut nonces = self.nonces.lock().map_err(|_| GateError::lock_poisoned())?;
        if nonces.contains_key(nonce) {
            return Ok(false);
        }
        nonces.insert(nonce.to_string(), expires_at);
        Ok(true)
    }

    fn cleanup_at(&self, now: DateTime<Utc>) -> GateResult<usize> {
        let mut nonces = self.nonces.lock().map_err(|_| GateError::lock_poisoned())?;
        let before = nonces.len();
        nonces.retain(|_, expires_at| *expires_at > now);
        Ok(before - nonces.len())
    }
}
