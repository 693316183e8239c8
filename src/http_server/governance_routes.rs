//! # Governance Routes
//!
//! Command policies, change approvals, maintenance windows and the
//! break-glass trail.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::errors::{api_error, ApiResult};
use super::extract::{client_info, require_principal};
use super::server::AppState;
use crate::audit::{record_best_effort, AuditOutcome, AuditRecord};
use crate::governance::{
    ApprovalRequest, ApprovalStatus, BreakGlassEvent, MaintenanceWindow, NewApproval,
    NewMaintenanceWindow,
};
use crate::policy::{NewPolicy, Policy, PolicyUpdate};
use crate::principal::{Principal, Role, PERM_CHANGE_APPROVE, PERM_CHANGE_REQUEST, PERM_READ};

#[derive(Debug, Serialize)]
pub struct PoliciesResponse {
    pub policies: Vec<Policy>,
}

#[derive(Debug, Serialize)]
pub struct ApprovalsResponse {
    pub approvals: Vec<ApprovalRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowsResponse {
    pub maintenance_windows: Vec<MaintenanceWindow>,
}

#[derive(Debug, Serialize)]
pub struct BreakGlassResponse {
    pub events: Vec<BreakGlassEvent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalQuery {
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveApprovalRequest {
    pub status: ApprovalStatus,
}

fn audit_change(
    state: &AppState,
    principal: &Principal,
    headers: &HeaderMap,
    action: &str,
    resource: &str,
    resource_id: &str,
    details: Value,
) {
    record_best_effort(
        state.audit.as_ref(),
        AuditRecord::new(action, resource, AuditOutcome::Success)
            .with_user(&principal.user_id)
            .with_resource_id(resource_id)
            .with_client(&client_info(headers))
            .with_details(details),
    );
}

// ==================
// Policies
// ==================

async fn list_policies_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<PoliciesResponse>> {
    let principal = require_principal(&state, &headers)?;
    principal.require_permission(PERM_READ).map_err(api_error)?;

    let policies = state.policies.list().map_err(api_error)?;
    Ok(Json(PoliciesResponse { policies }))
}

async fn create_policy_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(input): Json<NewPolicy>,
) -> ApiResult<(StatusCode, Json<Policy>)> {
    let principal = require_principal(&state, &headers)?;
    principal.require_role(Role::Admin).map_err(api_error)?;

    let policy = state.policies.create(input).map_err(api_error)?;
    tracing::info!(policy_id = %policy.id, environment = %policy.environment, "policy created");
    audit_change(
        &state,
        &principal,
        &headers,
        "policy_create",
        "policy",
        &policy.id,
        json!({"environment": policy.environment, "allowList": policy.allow_list}),
    );
    Ok((StatusCode::CREATED, Json(policy)))
}

async fn update_policy_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(update): Json<PolicyUpdate>,
) -> ApiResult<Json<Policy>> {
    let principal = require_principal(&state, &headers)?;
    principal.require_role(Role::Admin).map_err(api_error)?;

    let policy = state.policies.update(&id, update).map_err(api_error)?;
    audit_change(
        &state,
        &principal,
        &headers,
        "policy_update",
        "policy",
        &policy.id,
        json!({"environment": policy.environment, "requireApproval": policy.require_approval}),
    );
    Ok(Json(policy))
}

// ==================
// Approvals
// ==================

async fn list_approvals_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ApprovalQuery>,
) -> ApiResult<Json<ApprovalsResponse>> {
    let principal = require_principal(&state, &headers)?;
    principal.require_permission(PERM_READ).map_err(api_error)?;

    let approvals = state
        .governance
        .list_approvals(query.device_id.as_deref())
        .map_err(api_error)?;
    Ok(Json(ApprovalsResponse { approvals }))
}

async fn request_approval_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(input): Json<NewApproval>,
) -> ApiResult<(StatusCode, Json<ApprovalRequest>)> {
    let principal = require_principal(&state, &headers)?;
    principal.require_permission(PERM_CHANGE_REQUEST).map_err(api_error)?;

    let approval = state
        .governance
        .request_approval(input, &principal.user_id)
        .map_err(api_error)?;
    audit_change(
        &state,
        &principal,
        &headers,
        "approval_request",
        "approval",
        &approval.id,
        json!({"deviceId": approval.device_id, "ticketId": approval.ticket_id}),
    );
    Ok((StatusCode::CREATED, Json(approval)))
}

async fn resolve_approval_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<ResolveApprovalRequest>,
) -> ApiResult<Json<ApprovalRequest>> {
    let principal = require_principal(&state, &headers)?;
    principal.require_permission(PERM_CHANGE_APPROVE).map_err(api_error)?;

    let approval = state
        .governance
        .resolve_approval(&id, input.status, &principal.user_id)
        .map_err(api_error)?;
    tracing::info!(approval_id = %approval.id, status = ?approval.status, approver = %principal.user_id, "approval resolved");
    audit_change(
        &state,
        &principal,
        &headers,
        "approval_resolve",
        "approval",
        &approval.id,
        json!({"status": approval.status, "deviceId": approval.device_id}),
    );
    Ok(Json(approval))
}

// ==================
// Maintenance Windows
// ==================

async fn list_windows_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<WindowsResponse>> {
    let principal = require_principal(&state, &headers)?;
    principal.require_permission(PERM_READ).map_err(api_error)?;

    let maintenance_windows = state.governance.list_maintenance_windows().map_err(api_error)?;
    Ok(Json(WindowsResponse { maintenance_windows }))
}

async fn create_window_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(input): Json<NewMaintenanceWindow>,
) -> ApiResult<(StatusCode, Json<MaintenanceWindow>)> {
    let principal = require_principal(&state, &headers)?;
    principal.require_permission(PERM_CHANGE_APPROVE).map_err(api_error)?;

    let window = state
        .governance
        .create_maintenance_window(input, &principal.user_id)
        .map_err(api_error)?;
    audit_change(
        &state,
        &principal,
        &headers,
        "maintenance_window_create",
        "maintenance_window",
        &window.id,
        json!({"environment": window.environment, "startAt": window.start_at, "endAt": window.end_at}),
    );
    Ok((StatusCode::CREATED, Json(window)))
}

async fn list_break_glass_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<BreakGlassResponse>> {
    let principal = require_principal(&state, &headers)?;
    principal.require_role(Role::Admin).map_err(api_error)?;

    let events = state.governance.list_break_glass_events().map_err(api_error)?;
    Ok(Json(BreakGlassResponse { events }))
}

pub fn governance_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/policies", get(list_policies_handler).post(create_policy_handler))
        .route("/policies/:id", put(update_policy_handler))
        .route("/approvals", get(list_approvals_handler).post(request_approval_handler))
        .route("/approvals/:id/resolve", post(resolve_approval_handler))
        .route("/maintenance-windows", get(list_windows_handler).post(create_window_handler))
        .route("/break-glass", get(list_break_glass_handler))
        .with_state(state)
}
