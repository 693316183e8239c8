//! # Audit Sink
//!
//! Append-only record of every write-capable attempt: allowed, blocked,
//! dry-run and failed.
//!
//! Recording is best-effort from the caller's point of view: a failed append
//! is logged and swallowed, never surfaced as a request failure. Details are
//! redacted before they reach the sink.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::redaction::redact_details;

/// Audit record outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Action applied.
    Success,

    /// Action denied by policy or change control.
    Blocked,

    /// Action validated but not applied.
    DryRun,

    /// Action failed downstream.
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Blocked => "blocked",
            AuditOutcome::DryRun => "dry_run",
            AuditOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single audit record.
///
/// Carries `{userId, action, resource, resourceId, details, ipAddress,
/// userAgent}` plus id, timestamp and outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    /// e.g. `ssh_command`, `ssh_command_blocked`, `config_push_dry_run`
    pub action: String,
    /// e.g. `ssh`, `config`, `edge`
    pub resource: String,
    pub resource_id: Option<String>,
    pub outcome: AuditOutcome,
    pub details: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditRecord {
    pub fn new(action: impl Into<String>, resource: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user_id: None,
            action: action.into(),
            resource: resource.into(),
            resource_id: None,
            outcome,
            details: Value::Null,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    /// Set details. Always redacted on the way in.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = redact_details(&details);
        self
    }

    pub fn with_client(mut self, client: &ClientInfo) -> Self {
        self.ip_address = client.ip_address.clone();
        self.user_agent = client.user_agent.clone();
        self
    }

    /// Serialize to one JSON line
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"id":"{}","action":"{}"}}"#, self.id, self.action)
        })
    }
}

/// Request origin captured by the HTTP layer
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Audit sink trait.
///
/// Append-only. The record is visible once `append` returns `Ok`.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: &AuditRecord) -> io::Result<()>;
}

/// Append and swallow failures.
pub fn record_best_effort(sink: &dyn AuditSink, record: AuditRecord) {
    if let Err(e) = sink.append(&record) {
        tracing::error!(
            action = %record.action,
            resource = %record.resource,
            error = %e,
            "failed to write audit record"
        );
    }
}

/// File-based audit sink: one JSON record per line, synced per write
pub struct FileAuditSink {
    path: PathBuf,
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl FileAuditSink {
    /// Open or create an audit log file.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditSink {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        let json = record.to_json();
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "audit writer lock poisoned"))?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    }
}

/// In-memory audit sink.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Records with the given action name
    pub fn with_action(&self, action: &str) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.action == action)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        self.records
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "audit records lock poisoned"))?
            .push(record.clone());
        Ok(())
    }
}
