//! # Change-Control Gate
//!
//! Transport-agnostic rules for write-risk actions. SSH commands, config
//! pushes and edge job creation all build a [`ChangeControlContext`] and run
//! it through [`enforce_change_controls`]; the agent re-runs the same gate on
//! the signed payload.
//!
//! ## Check order
//! 1. dry-run short-circuits to [`GateDecision::DryRun`]
//! 2. write risk needs a change request id
//! 3. change risk needs approval or honoured break-glass
//! 4. a required maintenance window needs a window id unless break-glass
//! 5. dangerous risk needs a rollback plan
//!
//! Break-glass is honoured only when the caller computed
//! `break_glass_allowed`; otherwise the flag is inert.

use serde::{Deserialize, Serialize};

use crate::errors::{GateError, GateResult};
use crate::risk::RiskLevel;

/// Outcome of a passed gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Proceed with execution
    Allowed,
    /// Render and validate only; nothing is applied
    DryRun,
}

/// Caller-supplied change-control fields, shared by every request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangeRequestFields {
    pub risk_level: Option<RiskLevel>,
    pub reason: Option<String>,
    pub change_request_id: Option<String>,
    pub dry_run: bool,
    pub rollback_plan: Option<String>,
    pub precheck: Vec<String>,
    pub postcheck: Vec<String>,
    pub maintenance_window_id: Option<String>,
    pub break_glass: bool,
    pub ticket_id: Option<String>,
}

impl ChangeRequestFields {
    /// Ticket id used for approval lookups; blank becomes `UNASSIGNED`
    pub fn ticket_or_unassigned(&self) -> String {
        match self.ticket_id.as_deref().map(str::trim) {
            Some(ticket) if !ticket.is_empty() => ticket.to_string(),
            _ => "UNASSIGNED".to_string(),
        }
    }
}

/// Per-request change-control facts. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeControlContext {
    pub level: RiskLevel,
    pub change_request_id: Option<String>,
    pub approval_granted: bool,
    pub dry_run: bool,
    pub rollback_plan: Option<String>,
    pub precheck: Vec<String>,
    pub postcheck: Vec<String>,
    pub maintenance_window_id: Option<String>,
    pub break_glass: bool,
    /// Server-resolved: requested environment demands a window
    pub require_maintenance_window: bool,
    /// Server-resolved: caller holds the break-glass role
    pub break_glass_allowed: bool,
}

impl ChangeControlContext {
    pub fn new(level: RiskLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Context from caller fields; server-resolved facts start false
    pub fn from_fields(level: RiskLevel, fields: &ChangeRequestFields) -> Self {
        Self {
            level,
            change_request_id: fields.change_request_id.clone(),
            approval_granted: false,
            dry_run: fields.dry_run,
            rollback_plan: fields.rollback_plan.clone(),
            precheck: fields.precheck.clone(),
            postcheck: fields.postcheck.clone(),
            maintenance_window_id: fields.maintenance_window_id.clone(),
            break_glass: fields.break_glass,
            require_maintenance_window: false,
            break_glass_allowed: false,
        }
    }

    pub fn with_approval(mut self, granted: bool) -> Self {
        self.approval_granted = granted;
        self
    }

    pub fn with_maintenance_window_required(mut self, required: bool) -> Self {
        self.require_maintenance_window = required;
        self
    }

    pub fn with_break_glass_allowed(mut self, allowed: bool) -> Self {
        self.break_glass_allowed = allowed;
        self
    }

    /// Break-glass requested by someone entitled to it
    pub fn break_glass_honored(&self) -> bool {
        self.break_glass && self.break_glass_allowed
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Require a non-empty reason for write-risk actions
pub fn enforce_reason(level: RiskLevel, reason: Option<&str>) -> GateResult<()> {
    if level.is_write_risk() && is_blank(reason) {
        return Err(GateError::ReasonRequired);
    }
    Ok(())
}

/// Run the ordered change-control checks
pub fn enforce_change_controls(ctx: &ChangeControlContext) -> GateResult<GateDecision> {
    if ctx.dry_run {
        return Ok(GateDecision::DryRun);
    }

    if ctx.level.is_write_risk() && is_blank(ctx.change_request_id.as_deref()) {
        return Err(GateError::ChangeRequestRequired);
    }

    if ctx.level.is_change_risk() && !ctx.approval_granted && !ctx.break_glass_honored() {
        return Err(GateError::ApprovalRequired);
    }

    if ctx.level.is_write_risk()
        && ctx.require_maintenance_window
        && is_blank(ctx.maintenance_window_id.as_deref())
        && !ctx.break_glass_honored()
    {
        return Err(GateError::MaintenanceWindowRequired);
    }

    if ctx.level == RiskLevel::R3Dangerous && is_blank(ctx.rollback_plan.as_deref()) {
        return Err(GateError::RollbackPlanRequired);
    }

    Ok(GateDecision::Allowed)
}
