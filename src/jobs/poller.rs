//! Agent side: pull, verify, gate, execute and report.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::dispatcher::payload_fields;
use super::types::{JobEnvelope, JobOutcome, JobResultStatus, PollReport, SubmitResult};
use super::{JobExecutor, JobSource};
use crate::change_control::{enforce_change_controls, enforce_reason, ChangeControlContext};
use crate::edge::{is_allowed_target, PolicyBundle};
use crate::errors::GateResult;
use crate::replay::NonceStore;
use crate::signing::{check_binding, JobVerifier};

/// What the agent learned at pairing
#[derive(Debug, Clone)]
pub struct EdgeIdentity {
    pub edge_id: String,
    pub auth_token: String,
    pub policy_bundle: PolicyBundle,
}

/// Process-wide agent restrictions. Empty lists do not restrict.
#[derive(Debug, Clone, Default)]
pub struct AgentSettings {
    pub target_allowlist: Vec<String>,
    pub connectors_allowed: Vec<String>,
}

/// Edge agent poll loop
pub struct EdgePoller {
    source: Arc<dyn JobSource>,
    verifier: JobVerifier,
    nonces: Arc<dyn NonceStore>,
    executor: Arc<dyn JobExecutor>,
    identity: EdgeIdentity,
    settings: AgentSettings,
}

impl EdgePoller {
    pub fn new(
        source: Arc<dyn JobSource>,
        verifier: JobVerifier,
        nonces: Arc<dyn NonceStore>,
        executor: Arc<dyn JobExecutor>,
        identity: EdgeIdentity,
        settings: AgentSettings,
    ) -> Self {
        Self {
            source,
            verifier,
            nonces,
            executor,
            identity,
            settings,
        }
    }

    pub fn identity(&self) -> &EdgeIdentity {
        &self.identity
    }

    /// Pull up to `limit` jobs and process each one independently.
    ///
    /// Only a failed pull fails the call; per-job failures land in the report.
    pub fn poll_jobs(&self, limit: usize) -> GateResult<PollReport> {
        let jobs = self.source.pull(&self.identity.auth_token, limit)?;
        Ok(self.process_batch(&jobs, Utc::now()))
    }

    pub fn process_batch(&self, jobs: &[JobEnvelope], now: DateTime<Utc>) -> PollReport {
        let mut report = PollReport::default();
        for job in jobs {
            report.push(self.process_job(job, now));
        }
        report
    }

    fn process_job(&self, job: &JobEnvelope, now: DateTime<Utc>) -> JobOutcome {
        let outcome = self.run_checked(job, now).and_then(|output| {
            self.source
                .submit(
                    &self.identity.auth_token,
                    SubmitResult {
                        job_id: job.id.clone(),
                        status: JobResultStatus::Success,
                        output,
                        logs: Some("mock execution".to_string()),
                    },
                )
                .map_err(|e| e.to_string())
        });

        match outcome {
            Ok(()) => {
                tracing::info!(job_id = %job.id, job_type = %job.job_type, "job executed");
                JobOutcome {
                    job_id: job.id.clone(),
                    status: JobResultStatus::Success,
                    reason: None,
                }
            }
            Err(reason) => {
                tracing::warn!(job_id = %job.id, reason = %reason, "job rejected");
                let report = self.source.submit(
                    &self.identity.auth_token,
                    SubmitResult {
                        job_id: job.id.clone(),
                        status: JobResultStatus::Failed,
                        output: json!({"ok": false, "error": reason}),
                        logs: Some(reason.clone()),
                    },
                );
                if let Err(e) = report {
                    tracing::debug!(job_id = %job.id, error = %e, "failure report not accepted");
                }
                JobOutcome {
                    job_id: job.id.clone(),
                    status: JobResultStatus::Failed,
                    reason: Some(reason),
                }
            }
        }
    }

    /// Every local check, then nonce consumption and execution.
    /// Errors are human-readable rejection reasons.
    fn run_checked(&self, job: &JobEnvelope, now: DateTime<Utc>) -> Result<Value, String> {
        if self.nonces.is_used(&job.nonce).map_err(|e| e.to_string())? {
            return Err("Replay detected".to_string());
        }

        let claims = self
            .verifier
            .verify_at(&job.signature, now)
            .map_err(|e| e.to_string())?;
        check_binding(&claims, &job.binding(&self.identity.edge_id)).map_err(|e| e.to_string())?;

        let bundle = &self.identity.policy_bundle;

        let template_id = job
            .str_field("templateId")
            .ok_or_else(|| "templateId missing".to_string())?;
        if !bundle.allows_template(template_id) {
            return Err("Template not allowed".to_string());
        }

        let target = job.target();
        if !self.settings.target_allowlist.is_empty()
            && !is_allowed_target(target, &self.settings.target_allowlist)
        {
            return Err("Target not allowed by edge allowlist".to_string());
        }
        if !bundle.allows_target(target) {
            return Err("Target not allowed by policy bundle".to_string());
        }

        let connector = job.connector();
        if !self.settings.connectors_allowed.is_empty()
            && !connector.is_some_and(|c| self.settings.connectors_allowed.iter().any(|a| a == c))
        {
            return Err("Connector not allowed".to_string());
        }
        if !bundle.allows_connector(connector) {
            return Err("Connector not allowed by policy".to_string());
        }

        if bundle.first_blocked(&job.rendered_commands()).is_some() {
            return Err("Blocked command detected".to_string());
        }

        if job.payload.get("command").is_some_and(Value::is_string) {
            return Err("Raw commands are not allowed".to_string());
        }

        let fields = payload_fields(&job.payload).map_err(|e| e.to_string())?;
        let level = fields.risk_level.unwrap_or_default();
        enforce_reason(level, fields.reason.as_deref()).map_err(|e| e.to_string())?;
        let signed_approval = job.payload.get("approvalGranted") == Some(&Value::Bool(true));
        let ctx = ChangeControlContext::from_fields(level, &fields).with_approval(signed_approval);
        enforce_change_controls(&ctx).map_err(|e| e.to_string())?;

        let expires_at = claims.expires_at_time().ok_or_else(|| "Job expired".to_string())?;
        if !self.nonces.store(&job.nonce, expires_at).map_err(|e| e.to_string())? {
            return Err("Replay detected".to_string());
        }

        self.executor
            .execute(job, template_id)
            .map_err(|e| e.to_string())
    }
}
