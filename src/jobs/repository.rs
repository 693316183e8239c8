//! Job storage.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::types::{Job, JobResult, JobStatus};
use crate::errors::{GateError, GateResult};

/// Job repository trait
pub trait JobRepository: Send + Sync {
    fn insert(&self, job: Job) -> GateResult<()>;

    fn get(&self, id: &str) -> GateResult<Option<Job>>;

    fn list_for_edge(&self, edge_node_id: &str) -> GateResult<Vec<Job>>;

    /// Take up to `limit` queued, unexpired jobs for an edge, oldest first,
    /// and mark them running in the same step
    fn claim_queued(&self, edge_node_id: &str, limit: usize, now: DateTime<Utc>) -> GateResult<Vec<Job>>;

    /// Write the job's single result and final status
    fn record_result(&self, result: JobResult, status: JobStatus) -> GateResult<()>;

    fn get_result(&self, job_id: &str) -> GateResult<Option<JobResult>>;
}

#[derive(Debug, Default)]
struct JobState {
    jobs: Vec<Job>,
    results: HashMap<String, JobResult>,
}

/// In-memory job repository
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    state: RwLock<JobState>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobRepository for InMemoryJobRepository {
    fn insert(&self, job: Job) -> GateResult<()> {
        let mut state = self.state.write().map_err(|_| GateError::lock_poisoned())?;
        if state.jobs.iter().any(|j| j.id == job.id) {
            return Err(GateError::Conflict(format!("job {} already exists", job.id)));
        }
        state.jobs.push(job);
        Ok(())
    }

    fn get(&self, id: &str) -> GateResult<Option<Job>> {
        let state = self.state.read().map_err(|_| GateError::lock_poisoned())?;
        Ok(state.jobs.iter().find(|j| j.id == id).cloned())
    }

    fn list_for_edge(&self, edge_node_id: &str) -> GateResult<Vec<Job>> {
        let state = self.state.read().map_err(|_| GateError::lock_poisoned())?;
        Ok(state
            .jobs
            .iter()
            .filter(|j| j.edge_node_id == edge_node_id)
            .cloned()
            .collect())
    }

    fn claim_queued(&self, edge_node_id: &str, limit: usize, now: DateTime<Utc>) -> GateResult<Vec<Job>> {
        let mut state = self.state.write().map_err(|_| GateError::lock_poisoned())?;

        let mut queued: Vec<&mut Job> = state
            .jobs
            .iter_mut()
            .filter(|j| {
                j.edge_node_id == edge_node_id && j.status == JobStatus::Queued && !j.is_expired_at(now)
            })
            .collect();
        queued.sort_by_key(|j| j.created_at);

        Ok(queued
            .into_iter()
            .take(limit)
            .map(|job| {
                job.status = JobStatus::Running;
                job.clone()
            })
            .collect())
    }

    fn record_result(&self, result: JobResult, status: JobStatus) -> GateResult<()> {
        let mut state = self.state.write().map_err(|_| GateError::lock_poisoned())?;

        if state.results.contains_key(&result.job_id) {
            return Err(GateError::Conflict(format!(
                "result for job {} already recorded",
                result.job_id
            )));
        }

        let job = state
            .jobs
            .iter_mut()
            .find(|j| j.id == result.job_id)
            .ok_or_else(|| GateError::NotFound(format!("job {}", result.job_id)))?;
        job.status = status;

        state.results.insert(result.job_id.clone(), result);
        Ok(())
    }

    fn get_result(&self, job_id: &str) -> GateResult<Option<JobResult>> {
        let state = self.state.read().map_err(|_| GateError::lock_poisoned())?;
        Ok(state.results.get(job_id).cloned())
    }
}
