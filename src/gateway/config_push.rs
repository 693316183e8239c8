//! Device configuration push.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{failure_outcome, CommandGateway};
use crate::audit::{AuditOutcome, ClientInfo};
use crate::change_control::{enforce_reason, ChangeRequestFields, GateDecision};
use crate::errors::{GateError, GateResult};
use crate::policy::Environment;
use crate::principal::{Principal, PERM_CHANGE_EXECUTE};
use crate::redaction::{redact_commands, redact_sensitive};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigMetadata {
    #[serde(default)]
    pub environment: Option<String>,
}

/// Rendered config document; only its metadata is read here
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub metadata: Option<ConfigMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPushRequest {
    pub device_id: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub commands: Vec<String>,
    /// Takes precedence over `config.metadata.environment`
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub config: Option<ConfigDocument>,
    #[serde(flatten)]
    pub change: ChangeRequestFields,
}

impl ConfigPushRequest {
    fn environment_name(&self) -> Option<&str> {
        self.environment.as_deref().or_else(|| {
            self.config
                .as_ref()?
                .metadata
                .as_ref()?
                .environment
                .as_deref()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushStatus {
    Success,
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigPushOutcome {
    pub status: PushStatus,
    pub details: Vec<String>,
}

impl CommandGateway {
    pub fn push_config(
        &self,
        principal: &Principal,
        client: &ClientInfo,
        request: ConfigPushRequest,
    ) -> GateResult<ConfigPushOutcome> {
        self.push_config_at(principal, client, request, Utc::now())
    }

    /// Gate and apply a batch of configuration commands
    pub fn push_config_at(
        &self,
        principal: &Principal,
        client: &ClientInfo,
        request: ConfigPushRequest,
        now: DateTime<Utc>,
    ) -> GateResult<ConfigPushOutcome> {
        let mut environment = Environment::default();
        let result = self.push_config_checked(principal, &request, now, &mut environment);

        let level = request.change.risk_level.unwrap_or_default();
        let mut details = json!({
            "env": environment,
            "ticketId": request.change.ticket_or_unassigned(),
            "vendor": request.vendor,
            "commandCount": request.commands.len(),
            "riskLevel": level,
        });

        match &result {
            Ok(outcome) => {
                let (action, audit_outcome) = match outcome.status {
                    PushStatus::DryRun => ("config_push_dry_run", AuditOutcome::DryRun),
                    PushStatus::Success => ("config_push", AuditOutcome::Success),
                };
                details["sample"] = json!(request.commands.first().map(|c| redact_sensitive(c)));
                self.audit_attempt(
                    principal,
                    client,
                    action,
                    "config",
                    &request.device_id,
                    audit_outcome,
                    details,
                );
            }
            Err(e) => {
                tracing::warn!(
                    device_id = %request.device_id,
                    user_id = %principal.user_id,
                    risk = %level,
                    error = %e,
                    "config push blocked"
                );
                details["commands"] = json!(redact_commands(&request.commands));
                details["error"] = Value::String(e.to_string());
                self.audit_attempt(
                    principal,
                    client,
                    "config_push_blocked",
                    "config",
                    &request.device_id,
                    failure_outcome(e),
                    details,
                );
            }
        }
        result
    }

    fn push_config_checked(
        &self,
        principal: &Principal,
        request: &ConfigPushRequest,
        now: DateTime<Utc>,
        environment_out: &mut Environment,
    ) -> GateResult<ConfigPushOutcome> {
        let level = request.change.risk_level.unwrap_or_default();
        if !level.is_write_risk() {
            return Err(GateError::BadRequest(
                "Config push requires a write risk level".to_string(),
            ));
        }
        enforce_reason(level, request.change.reason.as_deref())?;
        principal.require_permission(PERM_CHANGE_EXECUTE)?;

        if request.device_id.trim().is_empty() {
            return Err(GateError::BadRequest("deviceId is required".to_string()));
        }
        if request.commands.is_empty() {
            return Err(GateError::BadRequest("Commands are required".to_string()));
        }

        let environment = Environment::parse_or_default(request.environment_name())?;
        *environment_out = environment;
        let policy = self.policies.resolve_for_environment(environment)?;
        let dangerous = policy.check_commands(&request.commands)?;

        let gate = self.resolve_gate(
            principal,
            level,
            &request.change,
            Some(&request.device_id),
            environment,
            now,
        )?;

        if gate.decision == GateDecision::DryRun {
            return Ok(ConfigPushOutcome {
                status: PushStatus::DryRun,
                details: vec!["Dry-run only. No config applied.".to_string()],
            });
        }

        if (environment.is_production() || policy.require_approval) && !gate.approval_satisfied() {
            return Err(GateError::ApprovalRequired);
        }
        if dangerous && environment.is_production() && !gate.approved {
            return Err(GateError::ApprovalRequired);
        }

        self.note_break_glass(principal, &gate, request.change.reason.as_deref())?;

        let details = self
            .transport
            .push_config(&request.device_id, &request.vendor, &request.commands)?;
        tracing::info!(device_id = %request.device_id, commands = request.commands.len(), risk = %level, "config pushed");

        Ok(ConfigPushOutcome {
            status: PushStatus::Success,
            details,
        })
    }
}
