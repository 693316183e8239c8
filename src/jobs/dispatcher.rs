//! Controller side: create, hand out and settle signed jobs.

use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::repository::JobRepository;
use super::types::{Job, JobEnvelope, JobResult, JobResultStatus, JobStatus, NewJob, SubmitResult};
use super::JobSource;
use crate::audit::{record_best_effort, AuditOutcome, AuditRecord, AuditSink};
use crate::change_control::{
    enforce_change_controls, enforce_reason, ChangeControlContext, ChangeRequestFields, GateDecision,
};
use crate::crypto::random_hex;
use crate::edge::EdgeRegistry;
use crate::errors::{GateError, GateResult};
use crate::governance::GovernanceStore;
use crate::principal::{Principal, PERM_CHANGE_EXECUTE};
use crate::signing::{check_binding, JobSigner, JobVerifier};

pub const DEFAULT_JOB_TTL_SECONDS: i64 = 60;
/// Longest job lifetime a caller may request (one day)
pub const MAX_JOB_TTL_SECONDS: i64 = 86_400;
pub const DEFAULT_PULL_LIMIT: usize = 5;
pub const MAX_PULL_LIMIT: usize = 50;

/// Reject raw commands and require `templateId` plus object `params`
pub fn assert_safe_payload(payload: &Value) -> GateResult<&Map<String, Value>> {
    let map = payload
        .as_object()
        .ok_or_else(|| GateError::BadRequest("payload must be an object".to_string()))?;

    if map.get("command").is_some_and(Value::is_string) {
        return Err(GateError::RawCommandRejected);
    }

    match map.get("templateId").and_then(Value::as_str) {
        Some(id) if !id.trim().is_empty() => {}
        _ => {
            return Err(GateError::BadRequest(
                "templateId is required for edge jobs".to_string(),
            ))
        }
    }

    match map.get("params") {
        None | Some(Value::Null) | Some(Value::Object(_)) => {}
        Some(_) => return Err(GateError::BadRequest("params must be an object".to_string())),
    }

    Ok(map)
}

/// Change-control fields embedded in a job payload
pub fn payload_fields(payload: &Value) -> GateResult<ChangeRequestFields> {
    serde_json::from_value(payload.clone())
        .map_err(|e| GateError::BadRequest(format!("invalid change-control fields: {e}")))
}

/// Job dispatcher
pub struct JobDispatcher {
    repository: Arc<dyn JobRepository>,
    edges: Arc<EdgeRegistry>,
    governance: Arc<dyn GovernanceStore>,
    audit: Arc<dyn AuditSink>,
    signer: JobSigner,
    verifier: JobVerifier,
    default_ttl: Duration,
}

impl JobDispatcher {
    pub fn new(
        repository: Arc<dyn JobRepository>,
        edges: Arc<EdgeRegistry>,
        governance: Arc<dyn GovernanceStore>,
        audit: Arc<dyn AuditSink>,
        signer: JobSigner,
        verifier: JobVerifier,
    ) -> Self {
        Self {
            repository,
            edges,
            governance,
            audit,
            signer,
            verifier,
            default_ttl: Duration::seconds(DEFAULT_JOB_TTL_SECONDS),
        }
    }

    /// Clamped to `1..=MAX_JOB_TTL_SECONDS`
    pub fn with_default_ttl(mut self, seconds: i64) -> Self {
        self.default_ttl = Duration::seconds(seconds.clamp(1, MAX_JOB_TTL_SECONDS));
        self
    }

    pub fn repository(&self) -> &Arc<dyn JobRepository> {
        &self.repository
    }

    /// Validate, gate, sign and queue a job.
    ///
    /// `approvalGranted` and `riskLevel` in the stored payload are always the
    /// controller's resolved values; caller-supplied ones are overwritten
    /// before signing.
    pub fn create_job(&self, principal: &Principal, request: NewJob) -> GateResult<Job> {
        let NewJob {
            tenant_id,
            edge_node_id,
            job_type,
            mut payload,
            ttl_seconds,
        } = request;

        if job_type.trim().is_empty() {
            return Err(GateError::BadRequest("jobType is required".to_string()));
        }
        assert_safe_payload(&payload)?;

        let edge = self.edges.get(&edge_node_id)?;
        if edge.tenant_id != tenant_id {
            return Err(GateError::NotFound(format!("edge node {edge_node_id}")));
        }

        let fields = payload_fields(&payload)?;
        let level = fields.risk_level.unwrap_or_default();
        if level.is_write_risk() {
            principal.require_permission(PERM_CHANGE_EXECUTE)?;
        }
        enforce_reason(level, fields.reason.as_deref())?;

        let approved = match payload.get("deviceId").and_then(Value::as_str) {
            Some(device_id) => self
                .governance
                .has_approved(device_id, &fields.ticket_or_unassigned())?,
            None => false,
        };
        let ctx = ChangeControlContext::from_fields(level, &fields)
            .with_approval(approved)
            .with_break_glass_allowed(principal.break_glass_allowed());

        let decision = match enforce_change_controls(&ctx) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(edge_id = %edge_node_id, job_type = %job_type, risk = %level, error = %e, "edge job denied");
                record_best_effort(
                    self.audit.as_ref(),
                    AuditRecord::new("edge_job_blocked", "edge_job", AuditOutcome::Blocked)
                        .with_user(&principal.user_id)
                        .with_resource_id(&edge_node_id)
                        .with_details(serde_json::json!({
                            "jobType": job_type,
                            "riskLevel": level,
                            "reason": e.to_string(),
                        })),
                );
                return Err(e);
            }
        };

        if ctx.break_glass_honored() && !approved && decision == GateDecision::Allowed {
            self.governance.record_break_glass(
                &principal.user_id,
                fields.reason.as_deref().unwrap_or("edge job break-glass"),
            )?;
            tracing::warn!(user_id = %principal.user_id, edge_id = %edge_node_id, "break-glass honoured for edge job");
        }

        if let Some(map) = payload.as_object_mut() {
            map.insert(
                "approvalGranted".to_string(),
                Value::Bool(approved || ctx.break_glass_honored()),
            );
            map.insert("riskLevel".to_string(), Value::String(level.as_str().to_string()));
        }

        let ttl = match ttl_seconds {
            Some(seconds) if seconds <= 0 => {
                return Err(GateError::BadRequest("ttlSeconds must be positive".to_string()))
            }
            Some(seconds) if seconds > MAX_JOB_TTL_SECONDS => {
                return Err(GateError::BadRequest(format!(
                    "ttlSeconds must be at most {MAX_JOB_TTL_SECONDS}"
                )))
            }
            Some(seconds) => Duration::seconds(seconds),
            None => self.default_ttl,
        };

        let now = Utc::now();
        let expires_at = (now + ttl).trunc_subsecs(3);
        let nonce = random_hex(10);
        let signature = self
            .signer
            .sign(&edge_node_id, &job_type, &payload, &nonce, expires_at)?;

        let job = Job {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            edge_node_id,
            job_type,
            payload,
            signature,
            nonce,
            expires_at,
            status: JobStatus::Queued,
            created_at: now,
        };
        self.repository.insert(job.clone())?;

        tracing::info!(job_id = %job.id, edge_id = %job.edge_node_id, job_type = %job.job_type, risk = %level, "edge job queued");
        record_best_effort(
            self.audit.as_ref(),
            AuditRecord::new("edge_job_create", "edge_job", AuditOutcome::Success)
                .with_user(&principal.user_id)
                .with_resource_id(&job.id)
                .with_details(serde_json::json!({
                    "edgeNodeId": job.edge_node_id,
                    "jobType": job.job_type,
                    "riskLevel": level,
                    "payload": job.payload,
                })),
        );

        Ok(job)
    }

    /// Hand queued jobs to the authenticated edge, marking them running
    pub fn pull_jobs(&self, edge_token: &str, limit: Option<usize>) -> GateResult<Vec<JobEnvelope>> {
        let edge = self.edges.authenticate(edge_token)?;
        let limit = limit.unwrap_or(DEFAULT_PULL_LIMIT).clamp(1, MAX_PULL_LIMIT);

        let jobs = self.repository.claim_queued(&edge.id, limit, Utc::now())?;
        if !jobs.is_empty() {
            tracing::debug!(edge_id = %edge.id, count = jobs.len(), "jobs pulled");
        }
        Ok(jobs.iter().map(Job::envelope).collect())
    }

    pub fn submit_result(&self, edge_token: &str, submission: SubmitResult) -> GateResult<()> {
        self.submit_result_at(edge_token, submission, Utc::now())
    }

    /// Settle a job with its one result after re-checking ownership,
    /// expiry and signature binding
    pub fn submit_result_at(
        &self,
        edge_token: &str,
        submission: SubmitResult,
        now: DateTime<Utc>,
    ) -> GateResult<()> {
        let edge = self.edges.authenticate(edge_token)?;

        let job = self
            .repository
            .get(&submission.job_id)?
            .filter(|job| job.edge_node_id == edge.id)
            .ok_or_else(|| GateError::NotFound(format!("job {}", submission.job_id)))?;

        if job.is_expired_at(now) {
            return Err(GateError::BadRequest("Job expired".to_string()));
        }

        let envelope = job.envelope();
        let bound = self
            .verifier
            .verify_at(&job.signature, now)
            .map_err(|e| e.to_string())
            .and_then(|claims| {
                check_binding(&claims, &envelope.binding(&job.edge_node_id)).map_err(|e| e.to_string())
            });
        if let Err(reason) = bound {
            tracing::error!(job_id = %job.id, reason = %reason, "stored job failed signature check");
            return Err(GateError::BadRequest("Job signature invalid".to_string()));
        }

        let status = match submission.status {
            JobResultStatus::Success => JobStatus::Completed,
            JobResultStatus::Failed => JobStatus::Failed,
        };
        self.repository.record_result(
            JobResult {
                job_id: job.id.clone(),
                status: submission.status,
                output: submission.output,
                logs: submission.logs,
                created_at: now,
            },
            status,
        )?;

        tracing::info!(job_id = %job.id, edge_id = %edge.id, status = ?status, "job result recorded");
        record_best_effort(
            self.audit.as_ref(),
            AuditRecord::new("edge_job_result", "edge_job", AuditOutcome::Success)
                .with_user(format!("edge:{}", edge.id))
                .with_resource_id(&job.id)
                .with_details(serde_json::json!({"status": submission.status})),
        );
        Ok(())
    }
}

impl JobSource for JobDispatcher {
    fn pull(&self, edge_token: &str, limit: usize) -> GateResult<Vec<JobEnvelope>> {
        self.pull_jobs(edge_token, Some(limit))
    }

    fn submit(&self, edge_token: &str, result: SubmitResult) -> GateResult<()> {
        self.submit_result(edge_token, result)
    }
}
