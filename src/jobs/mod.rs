//! # Edge Jobs
//!
//! Controller-side dispatch ([`JobDispatcher`]) and agent-side polling
//! ([`EdgePoller`]).
//!
//! The agent trusts nothing it did not verify: every pulled job is checked
//! for replay, signature and binding, template/target/connector scope,
//! blocked commands and raw commands, then run through the same
//! change-control gate the controller applied, using only the signed
//! `approvalGranted`.
//!
//! ## Invariants
//! - A payload carrying a string `command` never reaches execution
//! - A nonce executes at most once
//! - One failing job never aborts the rest of a poll batch
//! - Each job has at most one result

mod dispatcher;
mod poller;
mod repository;
mod types;

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::errors::GateResult;

pub use dispatcher::{
    assert_safe_payload, payload_fields, JobDispatcher, DEFAULT_JOB_TTL_SECONDS, DEFAULT_PULL_LIMIT,
    MAX_JOB_TTL_SECONDS, MAX_PULL_LIMIT,
};
pub use poller::{AgentSettings, EdgeIdentity, EdgePoller};
pub use repository::{InMemoryJobRepository, JobRepository};
pub use types::{
    Job, JobEnvelope, JobOutcome, JobResult, JobResultStatus, JobStatus, NewJob, PollReport,
    SubmitResult,
};

/// Where the agent gets jobs from and reports results to
pub trait JobSource: Send + Sync {
    fn pull(&self, edge_token: &str, limit: usize) -> GateResult<Vec<JobEnvelope>>;

    fn submit(&self, edge_token: &str, result: SubmitResult) -> GateResult<()>;
}

/// Runs a verified job
pub trait JobExecutor: Send + Sync {
    fn execute(&self, job: &JobEnvelope, template_id: &str) -> GateResult<Value>;
}

/// Transport-free executor: reports what would have run
#[derive(Debug, Clone, Copy, Default)]
pub struct MockExecutor;

impl JobExecutor for MockExecutor {
    fn execute(&self, job: &JobEnvelope, template_id: &str) -> GateResult<Value> {
        Ok(json!({
            "ok": true,
            "jobType": job.job_type,
            "templateId": template_id,
            "dryRun": job.payload.get("dryRun") != Some(&Value::Bool(false)),
            "executedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }))
    }
}
