//! Edge registry records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::allowlist::is_allowed_target;
use crate::policy::find_blocked;

/// Single-use pairing code
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCode {
    pub tenant_id: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub edge_node_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PairingCode {
    pub fn new(tenant_id: &str, code: &str, created_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            code: code.to_string(),
            expires_at,
            consumed_at: None,
            edge_node_id: None,
            created_at,
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Per-edge execution scope.
///
/// Empty-list semantics differ by field, and differ from the command
/// gateway's policy allow-list (where empty means nothing runs):
/// - `allowed_templates`, `allow_targets`, `allowed_connectors`: empty means
///   this bundle places no restriction on that dimension
/// - `blocked_commands`: empty means nothing is blocked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyBundle {
    pub allowed_connectors: Vec<String>,
    pub max_concurrency: u32,
    pub allow_targets: Vec<String>,
    pub allowed_templates: Vec<String>,
    pub blocked_commands: Vec<String>,
}

impl Default for PolicyBundle {
    fn default() -> Self {
        Self {
            allowed_connectors: ["ssh", "snmp", "zabbix", "syslog"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_concurrency: 3,
            allow_targets: Vec::new(),
            allowed_templates: Vec::new(),
            blocked_commands: ["reset", "reload", "format", "erase"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl PolicyBundle {
    pub fn allows_template(&self, template_id: &str) -> bool {
        self.allowed_templates.is_empty() || self.allowed_templates.iter().any(|t| t == template_id)
    }

    pub fn allows_target(&self, target: Option<&str>) -> bool {
        self.allow_targets.is_empty() || is_allowed_target(target, &self.allow_targets)
    }

    /// A restricted bundle rejects a job that names no connector
    pub fn allows_connector(&self, connector: Option<&str>) -> bool {
        if self.allowed_connectors.is_empty() {
            return true;
        }
        connector.is_some_and(|c| self.allowed_connectors.iter().any(|a| a == c))
    }

    /// First rendered command hitting a blocked substring
    pub fn first_blocked<'a>(&self, rendered: &'a [String]) -> Option<&'a str> {
        find_blocked(rendered, &self.blocked_commands)
    }
}

/// A paired edge agent
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeNode {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub instance_fingerprint: String,
    /// SHA-256 of the bearer token; the raw token is only returned at pairing
    #[serde(skip_serializing)]
    pub auth_token_hash: String,
    pub policy_bundle: PolicyBundle,
    pub created_at: DateTime<Utc>,
}

/// Edge fields supplied at pairing time; id and tenant come from the store
#[derive(Debug, Clone)]
pub struct NewEdgeNode {
    pub name: String,
    pub instance_fingerprint: String,
    pub auth_token_hash: String,
    pub policy_bundle: PolicyBundle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCodeResponse {
    pub pairing_code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairResponse {
    pub edge_id: String,
    pub auth_token: String,
    pub policy_bundle: PolicyBundle,
}
