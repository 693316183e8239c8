//! # Policy Store
//!
//! Per-environment allow, deny and dangerous command lists.
//!
//! ## Invariants
//! - One active policy per environment
//! - An empty allow-list grants nothing: command checks fail closed with
//!   [`GateError::AllowlistEmpty`]
//! - A command runs only if it matches at least one allow rule and no deny rule

pub mod matcher;
pub mod store;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{GateError, GateResult};

pub use matcher::{find_blocked, first_match, rule_matches};
pub use store::{InMemoryPolicyStore, NewPolicy, PolicyStore, PolicyUpdate};

/// Deployment tier a policy applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Staging,
    Prod,
    /// Fallback policy for any tier without its own
    All,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
            Environment::All => "all",
        }
    }

    /// Parse an optional environment name; absent means `dev`
    pub fn parse_or_default(raw: Option<&str>) -> GateResult<Self> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Environment::Dev),
            Some(value) => value.parse(),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

impl FromStr for Environment {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "staging" => Ok(Environment::Staging),
            "prod" => Ok(Environment::Prod),
            "all" => Ok(Environment::All),
            other => Err(GateError::BadRequest(format!("unknown environment '{other}'"))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verdict for a single command under a policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandVerdict {
    /// Permitted; `dangerous` flags a dangerous-list match
    Allowed { dangerous: bool },
    /// No allow rule matched
    NotAllowed,
    /// A deny rule matched
    Denied { rule: String },
}

/// Command policy for one environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub environment: Environment,
    pub allow_list: Vec<String>,
    pub deny_list: Vec<String>,
    pub dangerous_list: Vec<String>,
    pub require_approval: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    /// Fallback used when nothing else resolves. Grants nothing.
    pub fn builtin_default() -> Self {
        let now = Utc::now();
        Self {
            id: "policy-default".to_string(),
            name: "Default Policy".to_string(),
            environment: Environment::All,
            allow_list: Vec::new(),
            deny_list: ["reload", "erase", "reset-configuration", "format", "delete"]
                .into_iter()
                .map(String::from)
                .collect(),
            dangerous_list: ["reload", "erase", "reset-configuration", "write erase"]
                .into_iter()
                .map(String::from)
                .collect(),
            require_approval: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Classify one command. Does not consider an empty allow-list.
    pub fn evaluate(&self, command: &str) -> CommandVerdict {
        if let Some(rule) = first_match(command, &self.deny_list) {
            return CommandVerdict::Denied {
                rule: rule.to_string(),
            };
        }
        if first_match(command, &self.allow_list).is_none() {
            return CommandVerdict::NotAllowed;
        }
        CommandVerdict::Allowed {
            dangerous: first_match(command, &self.dangerous_list).is_some(),
        }
    }

    /// Check every command; returns whether any of them is dangerous
    pub fn check_commands<S: AsRef<str>>(&self, commands: &[S]) -> GateResult<bool> {
        if self.allow_list.is_empty() {
            return Err(GateError::AllowlistEmpty);
        }

        let mut dangerous = false;
        for command in commands {
            match self.evaluate(command.as_ref()) {
                CommandVerdict::Allowed { dangerous: d } => dangerous |= d,
                CommandVerdict::NotAllowed => {
                    return Err(GateError::CommandBlocked("not in allowlist".to_string()))
                }
                CommandVerdict::Denied { rule } => {
                    return Err(GateError::CommandBlocked(format!("matches deny rule '{rule}'")))
                }
            }
        }
        Ok(dangerous)
    }
}
