//! Policy storage and environment resolution.

use std::sync::RwLock;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{Environment, Policy};
use crate::errors::{GateError, GateResult};

/// New policy input
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPolicy {
    pub name: String,
    pub environment: Environment,
    #[serde(default)]
    pub allow_list: Vec<String>,
    #[serde(default)]
    pub deny_list: Vec<String>,
    #[serde(default)]
    pub dangerous_list: Vec<String>,
    #[serde(default)]
    pub require_approval: bool,
}

/// Partial policy update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyUpdate {
    pub name: Option<String>,
    pub allow_list: Option<Vec<String>>,
    pub deny_list: Option<Vec<String>>,
    pub dangerous_list: Option<Vec<String>>,
    pub require_approval: Option<bool>,
}

/// Policy store trait
pub trait PolicyStore: Send + Sync {
    fn list(&self) -> GateResult<Vec<Policy>>;

    /// Create the active policy for an environment
    fn create(&self, input: NewPolicy) -> GateResult<Policy>;

    fn update(&self, id: &str, update: PolicyUpdate) -> GateResult<Policy>;

    /// Exact environment, then `all`, then the built-in default
    fn resolve_for_environment(&self, environment: Environment) -> GateResult<Policy>;
}

/// In-memory policy store, seeded with the default `all` policy
#[derive(Debug)]
pub struct InMemoryPolicyStore {
    policies: RwLock<Vec<Policy>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self {
            policies: RwLock::new(vec![Policy::builtin_default()]),
        }
    }

    /// Store without the seeded default, for callers that load their own
    pub fn empty() -> Self {
        Self {
            policies: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn list(&self) -> GateResult<Vec<Policy>> {
        let policies = self.policies.read().map_err(|_| GateError::lock_poisoned())?;
        Ok(policies.clone())
    }

    fn create(&self, input: NewPolicy) -> GateResult<Policy> {
        let mut policies = self.policies.write().map_err(|_| GateError::lock_poisoned())?;

        if policies.iter().any(|p| p.environment == input.environment) {
            return Err(GateError::Conflict(format!(
                "policy for environment '{}' already exists",
                input.environment
            )));
        }

        let now = Utc::now();
        let policy = Policy {
            id: format!("policy_{}", Uuid::new_v4()),
            name: input.name,
            environment: input.environment,
            allow_list: input.allow_list,
            deny_list: input.deny_list,
            dangerous_list: input.dangerous_list,
            require_approval: input.require_approval,
            created_at: now,
            updated_at: now,
        };
        policies.push(policy.clone());
        Ok(policy)
    }

    fn update(&self, id: &str, update: PolicyUpdate) -> GateResult<Policy> {
        let mut policies = self.policies.write().map_err(|_| GateError::lock_poisoned())?;
        let policy = policies
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| GateError::NotFound(format!("policy {id}")))?;

        if let Some(name) = update.name {
            policy.name = name;
        }
        if let Some(list) = update.allow_list {
            policy.allow_list = list;
        }
        if let Some(list) = update.deny_list {
            policy.deny_list = list;
        }
        if let Some(list) = update.dangerous_list {
            policy.dangerous_list = list;
        }
        if let Some(flag) = update.require_approval {
            policy.require_approval = flag;
        }
        policy.updated_at = Utc::now();

        Ok(policy.clone())
    }

    fn resolve_for_environment(&self, environment: Environment) -> GateResult<Policy> {
        let policies = self.policies.read().map_err(|_| GateError::lock_poisoned())?;
        let resolved = policies
            .iter()
            .find(|p| p.environment == environment)
            .or_else(|| policies.iter().find(|p| p.environment == Environment::All))
            .cloned()
            .unwrap_or_else(Policy::builtin_default);
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_policy() -> NewPolicy {
        NewPolicy {
            name: "Dev".to_string(),
            environment: Environment::Dev,
            allow_list: vec!["show".to_string()],
            deny_list: vec!["reload".to_string()],
            dangerous_list: vec![],
            require_approval: false,
        }
    }

    #[test]
    fn test_resolve_falls_back_to_all() {
        let store = InMemoryPolicyStore::new();
        let policy = store.resolve_for_environment(Environment::Prod).unwrap();
        assert_eq!(policy.environment, Environment::All);
        assert!(policy.allow_list.is_empty());
    }

    #[test]
    fn test_resolve_falls_back_to_builtin_when_empty() {
        let store = InMemoryPolicyStore::empty();
        let policy = store.resolve_for_environment(Environment::Dev).unwrap();
        assert_eq!(policy.id, "policy-default");
    }

    #[test]
    fn test_resolve_exact_environment() {
        let store = InMemoryPolicyStore::new();
        let created = store.create(dev_policy()).unwrap();
        let resolved = store.resolve_for_environment(Environment::Dev).unwrap();
        assert_eq!(resolved.id, created.id);
        assert_eq!(resolved.allow_list, vec!["show".to_string()]);
    }

    #[test]
    fn test_one_policy_per_environment() {
        let store = InMemoryPolicyStore::new();
        store.create(dev_policy()).unwrap();
        assert!(matches!(store.create(dev_policy()), Err(GateError::Conflict(_))));
    }

    #[test]
    fn test_update_policy() {
        let store = InMemoryPolicyStore::new();
        let created = store.create(dev_policy()).unwrap();

        let updated = store
            .update(
                &created.id,
                PolicyUpdate {
                    allow_list: Some(vec![]),
                    require_approval: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated.allow_list.is_empty());
        assert!(updated.require_approval);
        assert_eq!(updated.deny_list, vec!["reload".to_string()]);

        assert!(matches!(
            store.update("policy_missing", PolicyUpdate::default()),
            Err(GateError::NotFound(_))
        ));
    }
}
