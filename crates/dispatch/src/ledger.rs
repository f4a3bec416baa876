//! In-memory job ledger.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde_json::Value;
use shared::domain::{Job, JobId, JobStatus, ProjectId};
use thiserror::Error;
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, info};

pub const DEFAULT_MAX_JOBS: usize = 1000;
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {job_id} already finished as {status:?}")]
    AlreadyFinished { job_id: JobId, status: JobStatus },
    #[error("job ledger is full")]
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    pub max_jobs: usize,
    /// How long a finished job stays visible before the sweeper drops it.
    pub job_ttl: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_jobs: DEFAULT_MAX_JOBS,
            job_ttl: DEFAULT_JOB_TTL,
        }
    }
}

/// Shared handle to the job store. Clones see the same jobs.
#[derive(Debug, Clone, Default)]
pub struct JobLedger {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
    config: LedgerConfig,
}

impl JobLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            jobs: Arc::default(),
            config,
        }
    }

    /// Records a new running job. At capacity the oldest finished job is
    /// evicted first.
    pub async fn create(&self, project_id: ProjectId) -> Result<JobId, LedgerError> {
        let mut jobs = self.jobs.write().await;
        if jobs.len() >= self.config.max_jobs {
            let oldest = jobs
                .values()
                .filter(|job| job.status.is_terminal())
                .min_by_key(|job| job.finished_at.unwrap_or(job.created_at))
                .map(|job| job.job_id)
                .ok_or(LedgerError::Full)?;
            jobs.remove(&oldest);
            debug!(job_id = %oldest, "evicted finished job at capacity");
        }

        let job_id = JobId::new();
        jobs.insert(
            job_id,
            Job {
                job_id,
                project_id,
                status: JobStatus::Running,
                created_at: Utc::now(),
                finished_at: None,
                result: None,
                error: None,
            },
        );
        Ok(job_id)
    }

    pub async fn complete(&self, job_id: JobId, result: Value) -> Result<(), LedgerError> {
        self.finish(job_id, JobStatus::Completed, Some(result), None)
            .await
    }

    pub async fn fail(&self, job_id: JobId, error: impl Into<String>) -> Result<(), LedgerError> {
        self.finish(job_id, JobStatus::Failed, None, Some(error.into()))
            .await
    }

    pub async fn time_out(
        &self,
        job_id: JobId,
        error: impl Into<String>,
    ) -> Result<(), LedgerError> {
        self.finish(job_id, JobStatus::TimedOut, None, Some(error.into()))
            .await
    }

    async fn finish(
        &self,
        job_id: JobId,
        status: JobStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<(), LedgerError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&job_id).ok_or(LedgerError::NotFound(job_id))?;
        if job.status.is_terminal() {
            return Err(LedgerError::AlreadyFinished {
                job_id,
                status: job.status,
            });
        }
        job.status = status;
        job.finished_at = Some(Utc::now());
        job.result = result;
        job.error = error;
        Ok(())
    }

    pub async fn get(&self, job_id: JobId) -> Result<Job, LedgerError> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(LedgerError::NotFound(job_id))
    }

    pub async fn list_all(&self) -> HashMap<JobId, Job> {
        self.jobs.read().await.clone()
    }

    pub async fn delete(&self, job_id: JobId) -> Result<(), LedgerError> {
        self.jobs
            .write()
            .await
            .remove(&job_id)
            .map(|_| ())
            .ok_or(LedgerError::NotFound(job_id))
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Drops finished jobs older than the configured TTL. Running jobs are
    /// kept regardless of age.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.config.job_ttl;
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| match job.finished_at {
            Some(finished_at) => (now - finished_at)
                .to_std()
                .map_or(true, |age| age <= ttl),
            None => true,
        });
        before - jobs.len()
    }

    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let ledger = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = ledger.sweep_expired(Utc::now()).await;
                if removed > 0 {
                    info!(removed, "swept expired jobs");
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "tests/ledger_tests.rs"]
mod tests;
