//! Job records and wire shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::signing::{format_expiry, SignedJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// A signed job owned by one edge node
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub tenant_id: String,
    pub edge_node_id: String,
    pub job_type: String,
    pub payload: Value,
    pub signature: String,
    pub nonce: String,
    /// Millisecond precision, matching the signed claim
    pub expires_at: DateTime<Utc>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// What the edge receives on pull
    pub fn envelope(&self) -> JobEnvelope {
        JobEnvelope {
            id: self.id.clone(),
            job_type: self.job_type.clone(),
            payload: self.payload.clone(),
            signature: self.signature.clone(),
            nonce: self.nonce.clone(),
            expires_at: format_expiry(self.expires_at),
        }
    }
}

/// Job as delivered to an edge agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    pub id: String,
    pub job_type: String,
    pub payload: Value,
    pub signature: String,
    pub nonce: String,
    pub expires_at: String,
}

impl JobEnvelope {
    /// Binding view of this envelope for `edge_node_id`
    pub fn binding<'a>(&'a self, edge_node_id: &'a str) -> SignedJob<'a> {
        SignedJob {
            edge_node_id,
            job_type: &self.job_type,
            nonce: &self.nonce,
            expires_at: &self.expires_at,
            payload: &self.payload,
        }
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// `target.ip`, falling back to `target.host`
    pub fn target(&self) -> Option<&str> {
        let target = self.payload.get("target")?;
        target
            .get("ip")
            .and_then(Value::as_str)
            .or_else(|| target.get("host").and_then(Value::as_str))
    }

    /// `connector`, falling back to `connectorType`
    pub fn connector(&self) -> Option<&str> {
        self.str_field("connector")
            .or_else(|| self.str_field("connectorType"))
    }

    /// Non-string entries are stringified
    pub fn rendered_commands(&self) -> Vec<String> {
        match self.payload.get("renderedCommands") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobResultStatus {
    Success,
    Failed,
}

/// The one result recorded for a job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job_id: String,
    pub status: JobResultStatus,
    pub output: Value,
    pub logs: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result submission from an edge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    pub job_id: String,
    pub status: JobResultStatus,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub logs: Option<String>,
}

/// Job creation request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub tenant_id: String,
    pub edge_node_id: String,
    pub job_type: String,
    pub payload: Value,
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
}

/// Per-job poll outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub job_id: String,
    pub status: JobResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReport {
    pub processed: usize,
    pub results: Vec<JobOutcome>,
}

impl PollReport {
    pub fn push(&mut self, outcome: JobOutcome) {
        self.results.push(outcome);
        self.processed = self.results.len();
    }

    pub fn outcome(&self, job_id: &str) -> Option<&JobOutcome> {
        self.results.iter().find(|r| r.job_id == job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(payload: Value) -> JobEnvelope {
        JobEnvelope {
            id: "job-1".to_string(),
            job_type: "netops.command".to_string(),
            payload,
            signature: "sig".to_string(),
            nonce: "n".to_string(),
            expires_at: "2026-10-16T10:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_target_and_connector_fallbacks() {
        let env = envelope(json!({"target": {"host": "rtr-1", "ip": "10.0.0.1"}, "connectorType": "snmp"}));
        assert_eq!(env.target(), Some("10.0.0.1"));
        assert_eq!(env.connector(), Some("snmp"));

        let env = envelope(json!({"target": {"host": "rtr-1"}, "connector": "ssh", "connectorType": "snmp"}));
        assert_eq!(env.target(), Some("rtr-1"));
        assert_eq!(env.connector(), Some("ssh"));

        let env = envelope(json!({}));
        assert_eq!(env.target(), None);
        assert_eq!(env.connector(), None);
    }

    #[test]
    fn test_rendered_commands() {
        let env = envelope(json!({"renderedCommands": ["show clock", 42]}));
        assert_eq!(env.rendered_commands(), vec!["show clock".to_string(), "42".to_string()]);
        assert!(envelope(json!({"renderedCommands": "x"})).rendered_commands().is_empty());
    }

    #[test]
    fn test_poll_report_serialization() {
        let mut report = PollReport::default();
        report.push(JobOutcome {
            job_id: "a".to_string(),
            status: JobResultStatus::Success,
            reason: None,
        });
        report.push(JobOutcome {
            job_id: "b".to_string(),
            status: JobResultStatus::Failed,
            reason: Some("Replay detected".to_string()),
        });

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["processed"], 2);
        assert!(json["results"][0].get("reason").is_none());
        assert_eq!(json["results"][1]["status"], "failed");
        assert_eq!(json["results"][1]["jobId"], "b");
    }
}
