//! # Command Gateway
//!
//! Synchronous device surfaces: templated SSH commands and config pushes.
//!
//! Each invocation moves `Requested -> RiskClassified -> ChangeControlChecked`
//! and ends `Blocked`, `DryRun` or `Executed`. Every ending is audited with
//! redacted command text.
//!
//! ## Invariants
//! - An empty command allow-list fails closed
//! - Dry-run skips approval, window and rollback checks but never the
//!   allow-list
//! - A dangerous command in prod needs a real approval, independent of the
//!   generic change gate

mod config_push;
mod sessions;
mod ssh;
mod templates;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::audit::{record_best_effort, AuditOutcome, AuditRecord, AuditSink, ClientInfo};
use crate::change_control::{
    enforce_change_controls, ChangeControlContext, ChangeRequestFields, GateDecision,
};
use crate::errors::{ErrorKind, GateError, GateResult};
use crate::governance::{resolve_active_window, GovernanceStore};
use crate::policy::{Environment, PolicyStore};
use crate::principal::Principal;
use crate::redaction::redact_sensitive;
use crate::risk::RiskLevel;

pub use config_push::{ConfigPushOutcome, ConfigPushRequest, PushStatus};
pub use sessions::{
    LogEventType, OpenSession, SessionLogEvent, SessionStatus, SessionStore, SshAuthType, SshSession,
    DEFAULT_IDLE_TIMEOUT_SECS,
};
pub use ssh::{CommandOutcome, SshCommandRequest};
pub use templates::{CommandTemplate, RenderedCommand, TemplateCatalog};

/// Device transport seam
pub trait DeviceTransport: Send + Sync {
    /// Run one command in an SSH session, returning output lines
    fn run_command(&self, session: &SshSession, command: &str) -> GateResult<Vec<String>>;

    /// Apply a batch of configuration commands to a device
    fn push_config(&self, device_id: &str, vendor: &str, commands: &[String]) -> GateResult<Vec<String>>;
}

/// Transport that touches nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct MockTransport;

impl DeviceTransport for MockTransport {
    fn run_command(&self, _session: &SshSession, command: &str) -> GateResult<Vec<String>> {
        Ok(vec![format!("executed: {}", redact_sensitive(command))])
    }

    fn push_config(&self, _device_id: &str, _vendor: &str, _commands: &[String]) -> GateResult<Vec<String>> {
        Ok(vec!["Config push accepted (mock).".to_string()])
    }
}

/// Server-resolved gate state for one request
#[derive(Debug, Clone)]
pub(crate) struct ResolvedGate {
    pub ctx: ChangeControlContext,
    pub decision: GateDecision,
    /// Governance approval on record for (device, ticket)
    pub approved: bool,
}

impl ResolvedGate {
    /// Approval or honoured break-glass
    pub fn approval_satisfied(&self) -> bool {
        self.approved || self.ctx.break_glass_honored()
    }
}

/// Command gateway
pub struct CommandGateway {
    policies: Arc<dyn PolicyStore>,
    governance: Arc<dyn GovernanceStore>,
    audit: Arc<dyn AuditSink>,
    templates: Arc<TemplateCatalog>,
    sessions: Arc<SessionStore>,
    transport: Arc<dyn DeviceTransport>,
}

impl CommandGateway {
    pub fn new(
        policies: Arc<dyn PolicyStore>,
        governance: Arc<dyn GovernanceStore>,
        audit: Arc<dyn AuditSink>,
        templates: Arc<TemplateCatalog>,
        sessions: Arc<SessionStore>,
        transport: Arc<dyn DeviceTransport>,
    ) -> Self {
        Self {
            policies,
            governance,
            audit,
            templates,
            sessions,
            transport,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn templates(&self) -> &Arc<TemplateCatalog> {
        &self.templates
    }

    /// Resolve approval, window and break-glass facts, then run the gate.
    ///
    /// A caller-supplied `maintenanceWindowId` only counts when the window
    /// exists, covers `environment` and is active at `now`.
    pub(crate) fn resolve_gate(
        &self,
        principal: &Principal,
        level: RiskLevel,
        fields: &ChangeRequestFields,
        device_id: Option<&str>,
        environment: Environment,
        now: DateTime<Utc>,
    ) -> GateResult<ResolvedGate> {
        let approved = match device_id.map(str::trim).filter(|d| !d.is_empty()) {
            Some(device_id) => self
                .governance
                .has_approved(device_id, &fields.ticket_or_unassigned())?,
            None => false,
        };

        // Dry-run never consults windows, so an unknown id cannot fail it
        let window = if fields.dry_run {
            None
        } else {
            resolve_active_window(
                self.governance.as_ref(),
                fields.maintenance_window_id.as_deref(),
                environment,
                now,
            )?
        };

        let mut ctx = ChangeControlContext::from_fields(level, fields)
            .with_approval(approved)
            .with_maintenance_window_required(environment.is_production())
            .with_break_glass_allowed(principal.break_glass_allowed());
        ctx.maintenance_window_id = window;

        if ctx.break_glass && !ctx.break_glass_allowed {
            tracing::warn!(user_id = %principal.user_id, role = %principal.role, "break-glass requested without entitlement; ignored");
        }

        let decision = enforce_change_controls(&ctx)?;
        Ok(ResolvedGate {
            ctx,
            decision,
            approved,
        })
    }

    /// Record a break-glass event when it actually bypassed something
    pub(crate) fn note_break_glass(
        &self,
        principal: &Principal,
        gate: &ResolvedGate,
        reason: Option<&str>,
    ) -> GateResult<()> {
        if gate.decision == GateDecision::Allowed && gate.ctx.break_glass_honored() && !gate.approved {
            self.governance
                .record_break_glass(&principal.user_id, reason.unwrap_or("break-glass"))?;
            tracing::warn!(user_id = %principal.user_id, "break-glass honoured");
        }
        Ok(())
    }

    pub(crate) fn audit_attempt(
        &self,
        principal: &Principal,
        client: &ClientInfo,
        action: &str,
        resource: &str,
        resource_id: &str,
        outcome: AuditOutcome,
        details: Value,
    ) {
        record_best_effort(
            self.audit.as_ref(),
            AuditRecord::new(action, resource, outcome)
                .with_user(&principal.user_id)
                .with_resource_id(resource_id)
                .with_client(client)
                .with_details(details),
        );
    }
}

/// Audit outcome for a failed attempt
pub(crate) fn failure_outcome(err: &GateError) -> AuditOutcome {
    match err.kind() {
        ErrorKind::ServiceUnavailable | ErrorKind::Internal => AuditOutcome::Failed,
        _ => AuditOutcome::Blocked,
    }
}
