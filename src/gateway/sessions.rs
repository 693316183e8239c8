//! # SSH Sessions
//!
//! Session bookkeeping for interactive device access. The transport itself
//! is mocked; what is real is the lifecycle and the per-session log.
//!
//! ## Invariants
//! - At most one connected session per (device, user); opening again reuses it
//! - A closed session never accepts another command
//! - Log messages are redacted before they are stored

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{GateError, GateResult};
use crate::redaction::redact_sensitive;

pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SshAuthType {
    #[default]
    Password,
    Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Connected,
    Closed,
}

/// Session model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshSession {
    pub id: String,
    pub device_id: String,
    pub device_name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub auth_type: SshAuthType,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub idle_timeout_sec: u64,
}

impl SshSession {
    pub fn is_connected(&self) -> bool {
        self.status == SessionStatus::Connected
    }

    fn is_idle_at(&self, now: DateTime<Utc>) -> bool {
        let idle = i64::try_from(self.idle_timeout_sec).unwrap_or(i64::MAX);
        now - self.last_active_at > Duration::seconds(idle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEventType {
    System,
    Input,
    Output,
    Error,
}

impl fmt::Display for LogEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogEventType::System => "SYSTEM",
            LogEventType::Input => "INPUT",
            LogEventType::Output => "OUTPUT",
            LogEventType::Error => "ERROR",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLogEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: LogEventType,
    pub message: String,
}

/// Open request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSession {
    pub device_id: String,
    #[serde(default)]
    pub device_name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub auth_type: SshAuthType,
    #[serde(default)]
    pub idle_timeout_sec: Option<u64>,
    #[serde(default)]
    pub ticket_id: Option<String>,
}

fn default_port() -> u16 {
    22
}

#[derive(Debug)]
struct SessionEntry {
    session: SshSession,
    log: Vec<SessionLogEvent>,
}

impl SessionEntry {
    fn push(&mut self, at: DateTime<Utc>, event_type: LogEventType, message: &str) {
        self.log.push(SessionLogEvent {
            timestamp: at,
            event_type,
            message: redact_sensitive(message),
        });
    }

    fn close(&mut self, at: DateTime<Utc>, reason: &str) {
        self.session.status = SessionStatus::Closed;
        self.session.last_active_at = at;
        self.push(at, LogEventType::System, reason);
    }
}

/// In-memory session store
#[derive(Debug)]
pub struct SessionStore {
    entries: RwLock<HashMap<String, SessionEntry>>,
    default_idle_timeout_secs: u64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT_SECS)
    }
}

impl SessionStore {
    pub fn new(default_idle_timeout_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_idle_timeout_secs,
        }
    }

    pub fn open(&self, input: OpenSession) -> GateResult<SshSession> {
        self.open_at(input, Utc::now())
    }

    /// Open a session, or touch and return the caller's live one for the
    /// same device
    pub fn open_at(&self, input: OpenSession, now: DateTime<Utc>) -> GateResult<SshSession> {
        if input.device_id.trim().is_empty() || input.host.trim().is_empty() || input.user.trim().is_empty() {
            return Err(GateError::BadRequest(
                "deviceId, host and user are required".to_string(),
            ));
        }

        let mut entries = self.entries.write().map_err(|_| GateError::lock_poisoned())?;

        if let Some(existing) = entries.values_mut().find(|e| {
            e.session.device_id == input.device_id && e.session.user == input.user && e.session.is_connected()
        }) {
            existing.session.last_active_at = now;
            return Ok(existing.session.clone());
        }

        let session = SshSession {
            id: format!("ssh_{}", Uuid::new_v4()),
            device_name: if input.device_name.is_empty() {
                input.device_id.clone()
            } else {
                input.device_name
            },
            device_id: input.device_id,
            host: input.host,
            port: input.port,
            user: input.user,
            auth_type: input.auth_type,
            created_at: now,
            last_active_at: now,
            status: SessionStatus::Connected,
            idle_timeout_sec: input.idle_timeout_sec.unwrap_or(self.default_idle_timeout_secs),
        };

        let mut entry = SessionEntry {
            session: session.clone(),
            log: Vec::new(),
        };
        entry.push(
            now,
            LogEventType::System,
            &format!(
                "SSH session opened to {}@{}:{}",
                session.user, session.host, session.port
            ),
        );
        entries.insert(session.id.clone(), entry);

        tracing::info!(session_id = %session.id, device_id = %session.device_id, user = %session.user, "ssh session opened");
        Ok(session)
    }

    pub fn list(&self) -> GateResult<Vec<SshSession>> {
        let entries = self.entries.read().map_err(|_| GateError::lock_poisoned())?;
        let mut sessions: Vec<_> = entries.values().map(|e| e.session.clone()).collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    pub fn get(&self, id: &str) -> GateResult<SshSession> {
        let entries = self.entries.read().map_err(|_| GateError::lock_poisoned())?;
        entries
            .get(id)
            .map(|e| e.session.clone())
            .ok_or_else(|| GateError::NotFound(format!("ssh session {id}")))
    }

    pub fn close(&self, id: &str, reason: &str) -> GateResult<SshSession> {
        let now = Utc::now();
        let mut entries = self.entries.write().map_err(|_| GateError::lock_poisoned())?;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| GateError::NotFound(format!("ssh session {id}")))?;
        if entry.session.is_connected() {
            entry.close(now, reason);
            tracing::info!(session_id = %id, reason = %reason, "ssh session closed");
        }
        Ok(entry.session.clone())
    }

    /// The session if it can take a command; touches `lastActiveAt`
    pub fn require_connected(&self, id: &str, now: DateTime<Utc>) -> GateResult<SshSession> {
        let mut entries = self.entries.write().map_err(|_| GateError::lock_poisoned())?;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| GateError::NotFound(format!("ssh session {id}")))?;
        if !entry.session.is_connected() {
            return Err(GateError::BadRequest("Session closed".to_string()));
        }
        entry.session.last_active_at = now;
        Ok(entry.session.clone())
    }

    /// Append a redacted log line
    pub fn record(&self, id: &str, event_type: LogEventType, message: &str) -> GateResult<()> {
        let mut entries = self.entries.write().map_err(|_| GateError::lock_poisoned())?;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| GateError::NotFound(format!("ssh session {id}")))?;
        entry.push(Utc::now(), event_type, message);
        Ok(())
    }

    pub fn log(&self, id: &str) -> GateResult<Vec<SessionLogEvent>> {
        let entries = self.entries.read().map_err(|_| GateError::lock_poisoned())?;
        entries
            .get(id)
            .map(|e| e.log.clone())
            .ok_or_else(|| GateError::NotFound(format!("ssh session {id}")))
    }

    /// `[timestamp] TYPE: message`, one line per event
    pub fn export_text(&self, id: &str) -> GateResult<String> {
        Ok(self
            .log(id)?
            .iter()
            .map(|event| {
                format!(
                    "[{}] {}: {}",
                    event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                    event.event_type,
                    event.message
                )
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    pub fn purge_idle(&self) -> GateResult<usize> {
        self.purge_idle_at(Utc::now())
    }

    /// Close connected sessions idle longer than their timeout
    pub fn purge_idle_at(&self, now: DateTime<Utc>) -> GateResult<usize> {
        let mut entries = self.entries.write().map_err(|_| GateError::lock_poisoned())?;
        let mut closed = 0;
        for entry in entries.values_mut() {
            if entry.session.is_connected() && entry.session.is_idle_at(now) {
                entry.close(now, "Closed due to idle timeout");
                closed += 1;
            }
        }
        if closed > 0 {
            tracing::info!(closed, "idle ssh sessions purged");
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_request(device: &str, user: &str) -> OpenSession {
        OpenSession {
            device_id: device.to_string(),
            device_name: "core-1".to_string(),
            host: "10.0.0.1".to_string(),
            port: 22,
            user: user.to_string(),
            auth_type: SshAuthType::Key,
            idle_timeout_sec: None,
            ticket_id: None,
        }
    }

    #[test]
    fn test_open_reuses_connected_session() {
        let store = SessionStore::default();
        let a = store.open(open_request("rtr-1", "alice")).unwrap();
        let b = store.open(open_request("rtr-1", "alice")).unwrap();
        let c = store.open(open_request("rtr-1", "bob")).unwrap();

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.idle_timeout_sec, DEFAULT_IDLE_TIMEOUT_SECS);
        assert_eq!(store.list().unwrap().len(), 2);

        store.close(&a.id, "Closed by user").unwrap();
        let d = store.open(open_request("rtr-1", "alice")).unwrap();
        assert_ne!(a.id, d.id);
    }

    #[test]
    fn test_closed_and_unknown_sessions_reject_commands() {
        let store = SessionStore::default();
        let session = store.open(open_request("rtr-1", "alice")).unwrap();
        assert!(store.require_connected(&session.id, Utc::now()).is_ok());

        store.close(&session.id, "Closed by user").unwrap();
        assert!(matches!(
            store.require_connected(&session.id, Utc::now()),
            Err(GateError::BadRequest(_))
        ));
        assert!(matches!(
            store.require_connected("ssh_missing", Utc::now()),
            Err(GateError::NotFound(_))
        ));
    }

    #[test]
    fn test_idle_purge() {
        let store = SessionStore::new(60);
        let t0 = Utc::now();
        let session = store.open_at(open_request("rtr-1", "alice"), t0).unwrap();

        assert_eq!(store.purge_idle_at(t0 + Duration::seconds(60)).unwrap(), 0);
        assert_eq!(store.purge_idle_at(t0 + Duration::seconds(61)).unwrap(), 1);
        assert!(!store.get(&session.id).unwrap().is_connected());
        assert_eq!(store.purge_idle_at(t0 + Duration::seconds(600)).unwrap(), 0);

        let log = store.log(&session.id).unwrap();
        assert_eq!(log.last().unwrap().message, "Closed due to idle timeout");
    }

    #[test]
    fn test_log_is_redacted_and_exported() {
        let store = SessionStore::default();
        let session = store.open(open_request("rtr-1", "alice")).unwrap();
        store
            .record(&session.id, LogEventType::Input, "username admin secret 0 Sup3rS3cret")
            .unwrap();

        let log = store.log(&session.id).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].event_type, LogEventType::System);
        assert!(!log[1].message.contains("Sup3rS3cret"));

        let text = store.export_text(&session.id).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("] SYSTEM: SSH session opened to alice@10.0.0.1:22"));
        assert!(lines[1].contains("] INPUT: username admin secret"));
        assert!(!text.contains("Sup3rS3cret"));
    }

    #[test]
    fn test_open_requires_identity() {
        let store = SessionStore::default();
        let mut input = open_request("rtr-1", "alice");
        input.host = " ".to_string();
        assert!(matches!(store.open(input), Err(GateError::BadRequest(_))));
    }
}
