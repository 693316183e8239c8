//! # Governance Records
//!
//! Approvals, maintenance windows and break-glass events. The gate only
//! consumes them as predicates (`has_approved`, active window lookup); the
//! records themselves follow a request/resolve lifecycle.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{GateError, GateResult};
use crate::policy::Environment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// Approval request for a change on one device under one ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: String,
    pub device_id: String,
    pub ticket_id: String,
    pub requested_by: String,
    pub reason: String,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApproval {
    pub device_id: String,
    pub ticket_id: String,
    pub reason: String,
}

/// Scheduled window during which production changes may run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceWindow {
    pub id: String,
    pub title: String,
    pub environment: Environment,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl MaintenanceWindow {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start_at <= now && now < self.end_at
    }

    pub fn covers(&self, environment: Environment) -> bool {
        self.environment == Environment::All || self.environment == environment
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMaintenanceWindow {
    pub title: String,
    pub environment: Environment,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

/// A privileged override that was actually honoured
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakGlassEvent {
    pub id: String,
    pub user_id: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Governance store trait
pub trait GovernanceStore: Send + Sync {
    fn list_approvals(&self, device_id: Option<&str>) -> GateResult<Vec<ApprovalRequest>>;

    fn request_approval(&self, input: NewApproval, requested_by: &str) -> GateResult<ApprovalRequest>;

    /// Resolve a pending approval; resolving twice is a conflict
    fn resolve_approval(
        &self,
        id: &str,
        status: ApprovalStatus,
        approver: &str,
    ) -> GateResult<ApprovalRequest>;

    fn has_approved(&self, device_id: &str, ticket_id: &str) -> GateResult<bool>;

    fn list_maintenance_windows(&self) -> GateResult<Vec<MaintenanceWindow>>;

    fn create_maintenance_window(
        &self,
        input: NewMaintenanceWindow,
        created_by: &str,
    ) -> GateResult<MaintenanceWindow>;

    fn record_break_glass(&self, user_id: &str, reason: &str) -> GateResult<BreakGlassEvent>;

    fn list_break_glass_events(&self) -> GateResult<Vec<BreakGlassEvent>>;
}

#[derive(Debug, Default)]
struct GovernanceState {
    approvals: Vec<ApprovalRequest>,
    maintenance_windows: Vec<MaintenanceWindow>,
    break_glass_events: Vec<BreakGlassEvent>,
}

/// In-memory governance store
#[derive(Debug, Default)]
pub struct InMemoryGovernanceStore {
    state: RwLock<GovernanceState>,
}

impl InMemoryGovernanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GovernanceStore for InMemoryGovernanceStore {
    fn list_approvals(&self, device_id: Option<&str>) -> GateResult<Vec<ApprovalRequest>> {
        let state = self.state.read().map_err(|_| GateError::lock_poisoned())?;
        Ok(state
            .approvals
            .iter()
            .filter(|a| device_id.map_or(true, |d| a.device_id == d))
            .cloned()
            .collect())
    }

    fn request_approval(&self, input: NewApproval, requested_by: &str) -> GateResult<ApprovalRequest> {
        if input.device_id.trim().is_empty() || input.ticket_id.trim().is_empty() {
            return Err(GateError::BadRequest(
                "deviceId and ticketId are required".to_string(),
            ));
        }

        let approval = ApprovalRequest {
            id: format!("approval_{}", Uuid::new_v4()),
            device_id: input.device_id,
            ticket_id: input.ticket_id,
            requested_by: requested_by.to_string(),
            reason: input.reason,
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
            approver: None,
        };

        let mut state = self.state.write().map_err(|_| GateError::lock_poisoned())?;
        state.approvals.push(approval.clone());
        Ok(approval)
    }

    fn resolve_approval(
        &self,
        id: &str,
        status: ApprovalStatus,
        approver: &str,
    ) -> GateResult<ApprovalRequest> {
        if status == ApprovalStatus::Pending {
            return Err(GateError::BadRequest(
                "approval can only be resolved to approved or rejected".to_string(),
            ));
        }

        let mut state = self.state.write().map_err(|_| GateError::lock_poisoned())?;
        let approval = state
            .approvals
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| GateError::NotFound(format!("approval {id}")))?;

        if approval.status != ApprovalStatus::Pending {
            return Err(GateError::Conflict(format!("approval {id} already resolved")));
        }

        approval.status = status;
        approval.approver = Some(approver.to_string());
        approval.resolved_at = Some(Utc::now());
        Ok(approval.clone())
    }

    fn has_approved(&self, device_id: &str, ticket_id: &str) -> GateResult<bool> {
        let state = self.state.read().map_err(|_| GateError::lock_poisoned())?;
        Ok(state.approvals.iter().any(|a| {
            a.device_id == device_id && a.ticket_id == ticket_id && a.status == ApprovalStatus::Approved
        }))
    }

    fn list_maintenance_windows(&self) -> GateResult<Vec<MaintenanceWindow>> {
        let state = self.state.read().map_err(|_| GateError::lock_poisoned())?;
        Ok(state.maintenance_windows.clone())
    }

    fn create_maintenance_window(
        &self,
        input: NewMaintenanceWindow,
        created_by: &str,
    ) -> GateResult<MaintenanceWindow> {
        if input.end_at <= input.start_at {
            return Err(GateError::BadRequest(
                "maintenance window must end after it starts".to_string(),
            ));
        }

        let window = MaintenanceWindow {
            id: format!("mw_{}", Uuid::new_v4()),
            title: input.title,
            environment: input.environment,
            start_at: input.start_at,
            end_at: input.end_at,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        };

        let mut state = self.state.write().map_err(|_| GateError::lock_poisoned())?;
        state.maintenance_windows.push(window.clone());
        Ok(window)
    }

    fn record_break_glass(&self, user_id: &str, reason: &str) -> GateResult<BreakGlassEvent> {
        let event = BreakGlassEvent {
            id: format!("bg_{}", Uuid::new_v4()),
            user_id: user_id.to_string(),
            reason: reason.to_string(),
            created_at: Utc::now(),
        };
        let mut state = self.state.write().map_err(|_| GateError::lock_poisoned())?;
        state.break_glass_events.push(event.clone());
        Ok(event)
    }

    fn list_break_glass_events(&self) -> GateResult<Vec<BreakGlassEvent>> {
        let state = self.state.read().map_err(|_| GateError::lock_poisoned())?;
        Ok(state.break_glass_events.clone())
    }
}

/// Resolve a caller-supplied maintenance window id.
///
/// Unknown ids are `NotFound`. A known window that is not active now, or
/// does not cover `environment`, resolves to `None` so the gate treats it
/// as absent.
pub fn resolve_active_window(
    store: &dyn GovernanceStore,
    window_id: Option<&str>,
    environment: Environment,
    now: DateTime<Utc>,
) -> GateResult<Option<String>> {
    let Some(id) = window_id.map(str::trim).filter(|id| !id.is_empty()) else {
        return Ok(None);
    };

    let window = store
        .list_maintenance_windows()?
        .into_iter()
        .find(|w| w.id == id)
        .ok_or_else(|| GateError::NotFound(format!("maintenance window {id}")))?;

    if window.is_active_at(now) && window.covers(environment) {
        Ok(Some(window.id))
    } else {
        Ok(None)
    }
}
