//! # Edge Routes
//!
//! Pairing, job creation and the agent job protocol. Operator routes take a
//! bearer token; agent routes take `x-edge-token`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::errors::{api_error, ApiResult};
use super::extract::{client_info, require_edge_token, require_principal};
use super::server::AppState;
use crate::audit::{record_best_effort, AuditOutcome, AuditRecord};
use crate::edge::{PairResponse, PairingCodeResponse};
use crate::jobs::{EdgeIdentity, EdgePoller, Job, JobEnvelope, JobSource, NewJob, PollReport, SubmitResult};
use crate::principal::Role;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCodeRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub ttl_minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairRequest {
    pub pairing_code: String,
    pub name: String,
    #[serde(default)]
    pub instance_fingerprint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PullResponse {
    pub jobs: Vec<JobEnvelope>,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub ok: bool,
}

async fn create_pairing_code_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<PairingCodeRequest>,
) -> ApiResult<(StatusCode, Json<PairingCodeResponse>)> {
    let principal = require_principal(&state, &headers)?;
    principal.require_role(Role::Admin).map_err(api_error)?;

    let issued = state
        .edges
        .create_pairing_code(&request.tenant_id, request.ttl_minutes)
        .map_err(api_error)?;

    record_best_effort(
        state.audit.as_ref(),
        AuditRecord::new("edge_pairing_code", "edge", AuditOutcome::Success)
            .with_user(&principal.user_id)
            .with_client(&client_info(&headers))
            .with_details(json!({"tenantId": request.tenant_id, "expiresAt": issued.expires_at})),
    );

    Ok((StatusCode::CREATED, Json(issued)))
}

async fn pair_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<PairRequest>,
) -> ApiResult<Json<PairResponse>> {
    let client = client_info(&headers);
    let paired = state.edges.pair_edge(
        &request.pairing_code,
        request.instance_fingerprint.as_deref(),
        &request.name,
    );

    let (outcome, resource_id) = match &paired {
        Ok(response) => (AuditOutcome::Success, response.edge_id.clone()),
        Err(_) => (AuditOutcome::Blocked, String::new()),
    };
    record_best_effort(
        state.audit.as_ref(),
        AuditRecord::new("edge_pair", "edge", outcome)
            .with_resource_id(resource_id)
            .with_client(&client)
            .with_details(json!({"name": request.name})),
    );

    paired.map(Json).map_err(api_error)
}

async fn create_job_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<NewJob>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let principal = require_principal(&state, &headers)?;
    let job = state
        .dispatcher
        .create_job(&principal, request)
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn pull_jobs_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<PullResponse>> {
    let token = require_edge_token(&headers)?;
    let jobs = state
        .dispatcher
        .pull_jobs(token, query.limit)
        .map_err(api_error)?;
    Ok(Json(PullResponse { jobs }))
}

/// Runs the agent poll cycle in-process for the calling edge
async fn poll_jobs_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<PollReport>> {
    let token = require_edge_token(&headers)?;
    let node = state.edges.authenticate(token).map_err(api_error)?;

    let source: Arc<dyn JobSource> = state.dispatcher.clone();
    let poller = EdgePoller::new(
        source,
        state.job_verifier.clone(),
        state.nonces.clone(),
        state.executor.clone(),
        EdgeIdentity {
            edge_id: node.id,
            auth_token: token.to_string(),
            policy_bundle: node.policy_bundle,
        },
        state.agent_settings.clone(),
    );

    let report = poller
        .poll_jobs(query.limit.unwrap_or(state.poll_limit))
        .map_err(api_error)?;
    Ok(Json(report))
}

async fn submit_result_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(submission): Json<SubmitResult>,
) -> ApiResult<Json<AckResponse>> {
    let token = require_edge_token(&headers)?;
    state
        .dispatcher
        .submit_result(token, submission)
        .map_err(api_error)?;
    Ok(Json(AckResponse { ok: true }))
}

pub fn edge_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/pairing-codes", post(create_pairing_code_handler))
        .route("/pair", post(pair_handler))
        .route("/jobs", post(create_job_handler))
        .route("/jobs/pull", get(pull_jobs_handler))
        .route("/jobs/poll", get(poll_jobs_handler).post(poll_jobs_handler))
        .route("/jobs/result", post(submit_result_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::super::server::test_support::TestApp;
    use super::super::extract::EDGE_TOKEN_HEADER;
    use crate::principal::Role;
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    async fn paired_edge(app: &TestApp) -> (String, String) {
        let admin = app.bearer("admin-1", Role::Admin);
        let (status, code) = app
            .send(
                "POST",
                "/edge/pairing-codes",
                &[("authorization", admin.as_str())],
                Some(json!({"tenantId": "tenant-1"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, paired) = app
            .send(
                "POST",
                "/edge/pair",
                &[],
                Some(json!({
                    "pairingCode": code["pairingCode"],
                    "name": "branch-edge",
                    "instanceFingerprint": "fp-1"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        (
            paired["edgeId"].as_str().unwrap().to_string(),
            paired["authToken"].as_str().unwrap().to_string(),
        )
    }

    async fn queue_job(app: &TestApp, edge_id: &str, payload: Value) -> (StatusCode, Value) {
        let netops = app.bearer("op-1", Role::Netops);
        app.send(
            "POST",
            "/edge/jobs",
            &[("authorization", netops.as_str())],
            Some(json!({
                "tenantId": "tenant-1",
                "edgeNodeId": edge_id,
                "jobType": "netops.command",
                "payload": payload
            })),
        )
        .await
    }

    #[tokio::test]
    async fn test_pairing_requires_admin() {
        let app = TestApp::new();
        let netops = app.bearer("op-1", Role::Netops);
        let (status, body) = app
            .send(
                "POST",
                "/edge/pairing-codes",
                &[("authorization", netops.as_str())],
                Some(json!({"tenantId": "tenant-1"})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], 403);

        let (status, _) = app
            .send("POST", "/edge/pairing-codes", &[], Some(json!({"tenantId": "t"})))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_pair_code_single_use() {
        let app = TestApp::new();
        let admin = app.bearer("admin-1", Role::Admin);
        let (_, code) = app
            .send(
                "POST",
                "/edge/pairing-codes",
                &[("authorization", admin.as_str())],
                Some(json!({"tenantId": "tenant-1", "ttlMinutes": 5})),
            )
            .await;
        let pair = json!({"pairingCode": code["pairingCode"], "name": "edge-a"});

        let (status, first) = app.send("POST", "/edge/pair", &[], Some(pair.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(first["policyBundle"]["blockedCommands"].is_array());

        let (status, body) = app.send("POST", "/edge/pair", &[], Some(pair)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Pairing code invalid or already used");

        assert_eq!(app.audit.with_action("edge_pair").len(), 2);
    }

    #[tokio::test]
    async fn test_job_roundtrip_through_poll() {
        let app = TestApp::new();
        let (edge_id, token) = paired_edge(&app).await;

        let (status, job) = queue_job(
            &app,
            &edge_id,
            json!({
                "templateId": "show_version",
                "params": {},
                "connector": "ssh",
                "target": {"ip": "10.0.0.1"}
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(job["status"], "queued");

        let (status, report) = app
            .send("POST", "/edge/jobs/poll", &[(EDGE_TOKEN_HEADER, token.as_str())], None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["processed"], 1);
        assert_eq!(report["results"][0]["jobId"], job["id"]);
        assert_eq!(report["results"][0]["status"], "success");

        let (_, report) = app
            .send("GET", "/edge/jobs/poll", &[(EDGE_TOKEN_HEADER, token.as_str())], None)
            .await;
        assert_eq!(report["processed"], 0);
    }

    #[tokio::test]
    async fn test_raw_command_job_rejected() {
        let app = TestApp::new();
        let (edge_id, _) = paired_edge(&app).await;
        let (status, body) = queue_job(
            &app,
            &edge_id,
            json!({"templateId": "show_version", "command": "reload"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Raw commands are not allowed; use templateId + params");
    }

    #[tokio::test]
    async fn test_pull_and_submit() {
        let app = TestApp::new();
        let (edge_id, token) = paired_edge(&app).await;
        queue_job(&app, &edge_id, json!({"templateId": "show_version", "params": {}})).await;

        let (status, pulled) = app
            .send("GET", "/edge/jobs/pull?limit=10", &[(EDGE_TOKEN_HEADER, token.as_str())], None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let jobs = pulled["jobs"].as_array().unwrap();
        assert_eq!(jobs.len(), 1);
        let job_id = jobs[0]["id"].clone();

        let result = json!({"jobId": job_id, "status": "success", "output": {"ok": true}});
        let (status, ack) = app
            .send(
                "POST",
                "/edge/jobs/result",
                &[(EDGE_TOKEN_HEADER, token.as_str())],
                Some(result.clone()),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["ok"], true);

        let (status, _) = app
            .send("POST", "/edge/jobs/result", &[(EDGE_TOKEN_HEADER, token.as_str())], Some(result))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_agent_routes_need_edge_token() {
        let app = TestApp::new();
        let (status, _) = app.send("GET", "/edge/jobs/pull", &[], None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = app
            .send("POST", "/edge/jobs/poll", &[(EDGE_TOKEN_HEADER, "bogus")], None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Edge token invalid");
    }
}
