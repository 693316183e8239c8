//! Edge registry storage.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{EdgeNode, NewEdgeNode, PairingCode};
use crate::crypto::constant_time_str_eq;
use crate::errors::{GateError, GateResult};

/// Edge repository trait
pub trait EdgeRepository: Send + Sync {
    /// Store a fresh pairing code. Reusing a live code is a conflict.
    fn insert_pairing_code(&self, code: PairingCode) -> GateResult<()>;

    fn find_pairing_code(&self, code: &str) -> GateResult<Option<PairingCode>>;

    /// Consume `code` and create the edge node as one step.
    ///
    /// Either both happen or neither does.
    fn consume_and_create(
        &self,
        code: &str,
        now: DateTime<Utc>,
        node: NewEdgeNode,
    ) -> GateResult<EdgeNode>;

    /// Drop codes that expired before `cutoff`; returns how many went
    fn purge_pairing_codes(&self, cutoff: DateTime<Utc>) -> GateResult<usize>;

    fn find_by_token_hash(&self, token_hash: &str) -> GateResult<Option<EdgeNode>>;

    fn get_node(&self, id: &str) -> GateResult<Option<EdgeNode>>;

    fn list_nodes(&self) -> GateResult<Vec<EdgeNode>>;
}

#[derive(Debug, Default)]
struct EdgeState {
    pairing_codes: Vec<PairingCode>,
    nodes: Vec<EdgeNode>,
}

/// In-memory edge repository
#[derive(Debug, Default)]
pub struct InMemoryEdgeRepository {
    state: RwLock<EdgeState>,
}

impl InMemoryEdgeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EdgeRepository for InMemoryEdgeRepository {
    fn insert_pairing_code(&self, code: PairingCode) -> GateResult<()> {
        let mut state = self.state.write().map_err(|_| GateError::lock_poisoned())?;
        if state.pairing_codes.iter().any(|c| c.code == code.code && !c.is_consumed()) {
            return Err(GateError::Conflict("pairing code already issued".to_string()));
        }
        state.pairing_codes.push(code);
        Ok(())
    }

    fn find_pairing_code(&self, code: &str) -> GateResult<Option<PairingCode>> {
        let state = self.state.read().map_err(|_| GateError::lock_poisoned())?;
        Ok(state.pairing_codes.iter().find(|c| c.code == code).cloned())
    }

    fn consume_and_create(
        &self,
        code: &str,
        now: DateTime<Utc>,
        node: NewEdgeNode,
    ) -> GateResult<EdgeNode> {
        let mut state = self.state.write().map_err(|_| GateError::lock_poisoned())?;

        let pairing = state
            .pairing_codes
            .iter()
            .rposition(|c| c.code == code)
            .ok_or(GateError::PairingInvalidOrUsed)?;

        if state.pairing_codes[pairing].is_consumed() {
            return Err(GateError::PairingInvalidOrUsed);
        }
        if state.pairing_codes[pairing].is_expired_at(now) {
            return Err(GateError::PairingExpired);
        }

        let edge = EdgeNode {
            id: Uuid::new_v4().to_string(),
            tenant_id: state.pairing_codes[pairing].tenant_id.clone(),
            name: node.name,
            instance_fingerprint: node.instance_fingerprint,
            auth_token_hash: node.auth_token_hash,
            policy_bundle: node.policy_bundle,
            created_at: now,
        };

        let record = &mut state.pairing_codes[pairing];
        record.consumed_at = Some(now);
        record.edge_node_id = Some(edge.id.clone());
        state.nodes.push(edge.clone());

        Ok(edge)
    }

    fn purge_pairing_codes(&self, cutoff: DateTime<Utc>) -> GateResult<usize> {
        let mut state = self.state.write().map_err(|_| GateError::lock_poisoned())?;
        let before = state.pairing_codes.len();
        state.pairing_codes.retain(|c| c.expires_at >= cutoff);
        Ok(before - state.pairing_codes.len())
    }

    fn find_by_token_hash(&self, token_hash: &str) -> GateResult<Option<EdgeNode>> {
        let state = self.state.read().map_err(|_| GateError::lock_poisoned())?;
        Ok(state
            .nodes
            .iter()
            .find(|n| constant_time_str_eq(&n.auth_token_hash, token_hash))
            .cloned())
    }

    fn get_node(&self, id: &str) -> GateResult<Option<EdgeNode>> {
        let state = self.state.read().map_err(|_| GateError::lock_poisoned())?;
        Ok(state.nodes.iter().find(|n| n.id == id).cloned())
    }

    fn list_nodes(&self) -> GateResult<Vec<EdgeNode>> {
        let state = self.state.read().map_err(|_| GateError::lock_poisoned())?;
        Ok(state.nodes.clone())
    }
}
