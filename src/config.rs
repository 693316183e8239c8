//! # Service Configuration
//!
//! JSON configuration file for `netops-gate serve`. Every section except
//! `signing` and `auth.jwt_secret` has defaults; the whole file is validated
//! after load.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::edge::{DEFAULT_PAIRING_TTL_MINUTES, MAX_PAIRING_TTL_MINUTES};
use crate::gateway::DEFAULT_IDLE_TIMEOUT_SECS;
use crate::http_server::HttpServerConfig;
use crate::jobs::{
    AgentSettings, DEFAULT_JOB_TTL_SECONDS, DEFAULT_PULL_LIMIT, MAX_JOB_TTL_SECONDS, MAX_PULL_LIMIT,
};
use crate::principal::JwtVerifierConfig;
use crate::signing::{JobSigner, JobVerifier};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Invalid config JSON: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Invalid signing key {path}: {message}")]
    SigningKey { path: PathBuf, message: String },
}

/// Job signing keypair locations (PEM, RSA-2048)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
}

/// Operator bearer token settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_audience")]
    pub audience: String,
}

fn default_issuer() -> String {
    "netops".to_string()
}

fn default_audience() -> String {
    "netops-gate".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: default_issuer(),
            audience: default_audience(),
        }
    }
}

impl AuthConfig {
    pub fn verifier_config(&self) -> JwtVerifierConfig {
        JwtVerifierConfig {
            secret: self.jwt_secret.clone(),
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Process-wide agent target allow-list; empty does not restrict
    #[serde(default)]
    pub target_allowlist: Vec<String>,

    /// Process-wide agent connector allow-list; empty does not restrict
    #[serde(default)]
    pub connectors_allowed: Vec<String>,

    #[serde(default = "default_pairing_ttl")]
    pub pairing_ttl_minutes: i64,

    #[serde(default = "default_job_ttl")]
    pub job_ttl_seconds: i64,

    #[serde(default = "default_poll_limit")]
    pub poll_limit: usize,

    #[serde(default = "default_cleanup_interval")]
    pub nonce_cleanup_interval_secs: u64,
}

fn default_pairing_ttl() -> i64 {
    DEFAULT_PAIRING_TTL_MINUTES
}

fn default_job_ttl() -> i64 {
    DEFAULT_JOB_TTL_SECONDS
}

fn default_poll_limit() -> usize {
    DEFAULT_PULL_LIMIT
}

fn default_cleanup_interval() -> u64 {
    60
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            target_allowlist: Vec::new(),
            connectors_allowed: Vec::new(),
            pairing_ttl_minutes: default_pairing_ttl(),
            job_ttl_seconds: default_job_ttl(),
            poll_limit: default_poll_limit(),
            nonce_cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl EdgeConfig {
    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            target_allowlist: self.target_allowlist.clone(),
            connectors_allowed: self.connectors_allowed.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_idle_timeout")]
    pub default_idle_timeout_secs: u64,
}

fn default_idle_timeout() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            default_idle_timeout_secs: default_idle_timeout(),
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub http: HttpServerConfig,

    pub signing: SigningConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub edge: EdgeConfig,

    #[serde(default)]
    pub ssh: SshConfig,

    /// JSON-lines audit file; in-memory sink when absent
    #[serde(default)]
    pub audit_log_path: Option<PathBuf>,
}

impl GatewayConfig {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing.private_key_path.as_os_str().is_empty()
            || self.signing.public_key_path.as_os_str().is_empty()
        {
            return Err(ConfigError::Invalid(
                "signing.private_key_path and signing.public_key_path are required".to_string(),
            ));
        }

        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("auth.jwt_secret is required".to_string()));
        }

        if !(1..=MAX_PAIRING_TTL_MINUTES).contains(&self.edge.pairing_ttl_minutes) {
            return Err(ConfigError::Invalid(format!(
                "edge.pairing_ttl_minutes must be between 1 and {MAX_PAIRING_TTL_MINUTES}"
            )));
        }
        if !(1..=MAX_JOB_TTL_SECONDS).contains(&self.edge.job_ttl_seconds) {
            return Err(ConfigError::Invalid(format!(
                "edge.job_ttl_seconds must be between 1 and {MAX_JOB_TTL_SECONDS}"
            )));
        }
        if self.edge.poll_limit == 0 || self.edge.poll_limit > MAX_PULL_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "edge.poll_limit must be between 1 and {MAX_PULL_LIMIT}"
            )));
        }
        if self.edge.nonce_cleanup_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "edge.nonce_cleanup_interval_secs must be > 0".to_string(),
            ));
        }
        if self.ssh.default_idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "ssh.default_idle_timeout_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Read both PEM files and build the signer/verifier pair
    pub fn load_signing_keys(&self) -> Result<(JobSigner, JobVerifier), ConfigError> {
        let private = read_key(&self.signing.private_key_path)?;
        let public = read_key(&self.signing.public_key_path)?;

        let signer = JobSigner::from_pem(&private).map_err(|e| ConfigError::SigningKey {
            path: self.signing.private_key_path.clone(),
            message: e.to_string(),
        })?;
        let verifier = JobVerifier::from_pem(&public).map_err(|e| ConfigError::SigningKey {
            path: self.signing.public_key_path.clone(),
            message: e.to_string(),
        })?;
        Ok((signer, verifier))
    }
}

fn read_key(path: &Path) -> Result<Vec<u8>, ConfigError> {
    fs::read(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
