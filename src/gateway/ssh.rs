//! Templated SSH command execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::sessions::{LogEventType, OpenSession, SshSession};
use super::{failure_outcome, CommandGateway};
use crate::audit::{AuditOutcome, ClientInfo};
use crate::change_control::{enforce_reason, ChangeRequestFields, GateDecision};
use crate::errors::{GateError, GateResult};
use crate::policy::Environment;
use crate::principal::{Principal, PERM_CHANGE_EXECUTE, PERM_READ};
use crate::redaction::{redact_commands, redact_sensitive};
use crate::risk::RiskLevel;

const DANGEROUS_WARNING: &str = "Dangerous command flagged.";

/// Command request for an open session
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshCommandRequest {
    pub template_id: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Defaults to the session's device
    #[serde(default)]
    pub device_id: Option<String>,
    /// `dev` when absent
    #[serde(default)]
    pub environment: Option<String>,
    /// Only ever present to be rejected
    #[serde(default)]
    pub command: Option<Value>,
    #[serde(flatten)]
    pub change: ChangeRequestFields,
}

/// Result of a command that passed every gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status")]
pub enum CommandOutcome {
    #[serde(rename = "dry_run")]
    DryRun {
        command: String,
        #[serde(rename = "riskLevel")]
        risk_level: RiskLevel,
    },
    #[serde(rename = "success")]
    Executed {
        command: String,
        #[serde(rename = "riskLevel")]
        risk_level: RiskLevel,
        output: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
    },
}

impl CommandOutcome {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, CommandOutcome::DryRun { .. })
    }
}

/// What is known about an attempt when it stops
#[derive(Debug, Default)]
struct Attempt {
    connected: bool,
    command: Option<String>,
    level: RiskLevel,
    environment: Environment,
}

impl CommandGateway {
    pub fn open_session(
        &self,
        principal: &Principal,
        client: &ClientInfo,
        input: OpenSession,
    ) -> GateResult<SshSession> {
        principal.require_permission(PERM_READ)?;
        let ticket_id = ChangeRequestFields {
            ticket_id: input.ticket_id.clone(),
            ..Default::default()
        }
        .ticket_or_unassigned();

        let session = self.sessions.open(input)?;
        self.audit_attempt(
            principal,
            client,
            "ssh_open",
            "ssh",
            &session.id,
            AuditOutcome::Success,
            json!({"deviceId": session.device_id, "ticketId": ticket_id}),
        );
        Ok(session)
    }

    pub fn close_session(
        &self,
        principal: &Principal,
        client: &ClientInfo,
        session_id: &str,
    ) -> GateResult<SshSession> {
        let session = self.sessions.close(session_id, "Closed by user")?;
        self.audit_attempt(
            principal,
            client,
            "ssh_close",
            "ssh",
            session_id,
            AuditOutcome::Success,
            json!({"deviceId": session.device_id}),
        );
        Ok(session)
    }

    /// Purges idle sessions first so the listing reflects reality
    pub fn list_sessions(&self) -> GateResult<Vec<SshSession>> {
        self.sessions.purge_idle()?;
        self.sessions.list()
    }

    pub fn run_ssh_command(
        &self,
        principal: &Principal,
        client: &ClientInfo,
        session_id: &str,
        request: SshCommandRequest,
    ) -> GateResult<CommandOutcome> {
        self.run_ssh_command_at(principal, client, session_id, request, Utc::now())
    }

    /// Render, classify, gate and run one templated command. Every ending
    /// is audited.
    pub fn run_ssh_command_at(
        &self,
        principal: &Principal,
        client: &ClientInfo,
        session_id: &str,
        request: SshCommandRequest,
        now: DateTime<Utc>,
    ) -> GateResult<CommandOutcome> {
        let mut attempt = Attempt::default();
        let result = self.ssh_command_checked(principal, session_id, &request, now, &mut attempt);

        let command = attempt.command.as_deref().map(redact_sensitive);
        let details = json!({
            "templateId": request.template_id,
            "command": command,
            "deviceId": request.device_id,
            "ticketId": request.change.ticket_or_unassigned(),
            "environment": attempt.environment,
            "riskLevel": attempt.level,
        });

        match &result {
            Ok(outcome) => {
                let (action, audit_outcome) = if outcome.is_dry_run() {
                    ("ssh_command_dry_run", AuditOutcome::DryRun)
                } else {
                    ("ssh_command", AuditOutcome::Success)
                };
                self.audit_attempt(principal, client, action, "ssh", session_id, audit_outcome, details);
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    user_id = %principal.user_id,
                    template_id = %request.template_id,
                    command = command.as_deref().unwrap_or(""),
                    error = %e,
                    "ssh command blocked"
                );
                if attempt.connected {
                    let message = format!("Command blocked: {e}");
                    if let Err(log_err) = self.sessions.record(session_id, LogEventType::Error, &message) {
                        tracing::debug!(session_id = %session_id, error = %log_err, "session log append failed");
                    }
                }
                let mut details = details;
                details["error"] = Value::String(e.to_string());
                self.audit_attempt(
                    principal,
                    client,
                    "ssh_command_blocked",
                    "ssh",
                    session_id,
                    failure_outcome(e),
                    details,
                );
            }
        }
        result
    }

    fn ssh_command_checked(
        &self,
        principal: &Principal,
        session_id: &str,
        request: &SshCommandRequest,
        now: DateTime<Utc>,
        attempt: &mut Attempt,
    ) -> GateResult<CommandOutcome> {
        let session = self.sessions.require_connected(session_id, now)?;
        attempt.connected = true;

        if request.command.as_ref().is_some_and(Value::is_string) {
            return Err(GateError::RawCommandRejected);
        }

        let rendered = self.templates.render(&request.template_id, &request.params)?;
        attempt.command = Some(rendered.command.clone());

        // An explicit level can raise the template's risk, never lower it
        let level = request
            .change
            .risk_level
            .map_or(rendered.default_risk, |l| l.max(rendered.default_risk));
        attempt.level = level;
        if level.is_write_risk() {
            principal.require_permission(PERM_CHANGE_EXECUTE)?;
        }
        enforce_reason(level, request.change.reason.as_deref())?;

        let environment = Environment::parse_or_default(request.environment.as_deref())?;
        attempt.environment = environment;
        let policy = self.policies.resolve_for_environment(environment)?;
        let dangerous = policy.check_commands(&[rendered.command.as_str()])?;

        let device_id = request.device_id.as_deref().unwrap_or(&session.device_id);
        let gate = self.resolve_gate(principal, level, &request.change, Some(device_id), environment, now)?;

        if gate.decision == GateDecision::DryRun {
            return Ok(CommandOutcome::DryRun {
                command: redact_sensitive(&rendered.command),
                risk_level: level,
            });
        }

        if (environment.is_production() || policy.require_approval) && !gate.approval_satisfied() {
            return Err(GateError::ApprovalRequired);
        }
        if dangerous && environment.is_production() && !gate.approved {
            return Err(GateError::ApprovalRequired);
        }

        self.note_break_glass(principal, &gate, request.change.reason.as_deref())?;

        let output = self.transport.run_command(&session, &rendered.command)?;
        self.sessions
            .record(session_id, LogEventType::Input, &rendered.command)?;
        for line in &output {
            self.sessions.record(session_id, LogEventType::Output, line)?;
        }

        tracing::info!(session_id = %session_id, template_id = %rendered.template_id, risk = %level, "ssh command executed");
        Ok(CommandOutcome::Executed {
            command: redact_sensitive(&rendered.command),
            risk_level: level,
            output: redact_commands(&output),
            warning: dangerous.then(|| DANGEROUS_WARNING.to_string()),
        })
    }
}
