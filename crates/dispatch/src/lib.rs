//! Resolves project identifiers to executable units and runs them.
//!
//! [`Dispatcher::invoke`] is the untracked call path. [`Dispatcher::run`] and
//! [`Dispatcher::submit`] record each invocation in the [`JobLedger`], either
//! inline or from a spawned task.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use registry::Registry;
use serde_json::Value;
use shared::{
    domain::{JobId, JobStatus, ProjectId},
    protocol::{InvocationResult, Parameters, RunProjectResponse},
};
use thiserror::Error;
use tracing::{info, warn};
use units::{EntryPoint, LookupError, UnitError, UnitTable};

pub mod catalog;
pub mod ledger;

pub use catalog::CatalogError;
pub use ledger::{JobLedger, LedgerConfig, LedgerError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Project {0} not found")]
    ProjectNotFound(String),
    #[error("Module {0} not found")]
    UnitNotFound(String),
    #[error("Function {function} not found in module {module}")]
    EntryPointMissing { module: String, function: String },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<LookupError> for DispatchError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::UnitNotFound(module) => Self::UnitNotFound(module),
            LookupError::EntryPointMissing { module, function } => {
                Self::EntryPointMissing { module, function }
            }
        }
    }
}

/// Terminal state of one call, before it is shaped for a caller.
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Completed(Value),
    Failed(String),
    TimedOut(String),
}

impl Outcome {
    fn status(&self) -> JobStatus {
        match self {
            Self::Completed(_) => JobStatus::Completed,
            Self::Failed(_) => JobStatus::Failed,
            Self::TimedOut(_) => JobStatus::TimedOut,
        }
    }

    fn into_invocation(self) -> InvocationResult {
        match self {
            Self::Completed(value) => InvocationResult::ok(value),
            Self::Failed(error) | Self::TimedOut(error) => InvocationResult::failed(error),
        }
    }
}

impl From<Result<Value, UnitError>> for Outcome {
    fn from(result: Result<Value, UnitError>) -> Self {
        match result {
            Ok(value) => Self::Completed(value),
            Err(err @ UnitError::TimedOut { .. }) => Self::TimedOut(err.to_string()),
            Err(err) => Self::Failed(err.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    units: Arc<UnitTable>,
    ledger: JobLedger,
    call_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, units: Arc<UnitTable>, ledger: JobLedger) -> Self {
        Self {
            registry,
            units,
            ledger,
            call_timeout: None,
        }
    }

    /// Caps every in-process call. `None` leaves calls unbounded.
    pub fn with_call_timeout(mut self, call_timeout: Option<Duration>) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    pub fn resolve(&self, id: &str) -> Result<(ProjectId, Arc<dyn EntryPoint>), DispatchError> {
        let project = self
            .registry
            .get(id)
            .map_err(|_| DispatchError::ProjectNotFound(id.to_string()))?;
        let entry_point = self.units.lookup(&project.unit)?;
        Ok((project.id.clone(), entry_point))
    }

    /// Untracked invocation. Callee failures come back as
    /// `success: false`; only resolution problems are errors.
    pub async fn invoke(
        &self,
        id: &str,
        parameters: Parameters,
    ) -> Result<InvocationResult, DispatchError> {
        let (project_id, entry_point) = self.resolve(id)?;
        let outcome = self.call(entry_point, parameters).await;
        if let Outcome::Failed(error) | Outcome::TimedOut(error) = &outcome {
            warn!(%project_id, %error, "invocation failed");
        }
        Ok(outcome.into_invocation())
    }

    /// Tracked invocation that waits for the result. Resolution failures
    /// create no job.
    pub async fn run(
        &self,
        id: &str,
        parameters: Parameters,
    ) -> Result<RunProjectResponse, DispatchError> {
        let (project_id, entry_point) = self.resolve(id)?;
        let job_id = self.ledger.create(project_id.clone()).await?;
        info!(%project_id, %job_id, "running project");

        let outcome = self.call(entry_point, parameters).await;
        let status = outcome.status();
        record(&self.ledger, &project_id, job_id, outcome.clone()).await;

        Ok(RunProjectResponse {
            outcome: outcome.into_invocation(),
            job_id,
            status,
        })
    }

    /// Tracked invocation on a background task. Returns as soon as the job
    /// exists; poll the ledger for the result.
    pub async fn submit(&self, id: &str, parameters: Parameters) -> Result<JobId, DispatchError> {
        let (project_id, entry_point) = self.resolve(id)?;
        let job_id = self.ledger.create(project_id.clone()).await?;
        info!(%project_id, %job_id, "submitted background job");

        let dispatcher = self.clone();
        tokio::spawn(async move {
            let outcome = dispatcher.call(entry_point, parameters).await;
            record(&dispatcher.ledger, &project_id, job_id, outcome).await;
        });
        Ok(job_id)
    }

    // A panicking unit is reported as a failed call so its job still reaches
    // a terminal state.
    async fn call(&self, entry_point: Arc<dyn EntryPoint>, parameters: Parameters) -> Outcome {
        let call = AssertUnwindSafe(entry_point.call(parameters)).catch_unwind();
        let caught = match self.call_timeout {
            Some(budget) => match tokio::time::timeout(budget, call).await {
                Ok(caught) => caught,
                Err(_) => {
                    return Outcome::from(Err(UnitError::TimedOut {
                        elapsed_ms: budget.as_millis() as u64,
                    }))
                }
            },
            None => call.await,
        };
        match caught {
            Ok(result) => result.into(),
            Err(payload) => {
                Outcome::Failed(format!("unit panicked: {}", panic_message(&*payload)))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

async fn record(ledger: &JobLedger, project_id: &ProjectId, job_id: JobId, outcome: Outcome) {
    let status = outcome.status();
    let recorded = match outcome {
        Outcome::Completed(value) => ledger.complete(job_id, value).await,
        Outcome::Failed(error) => ledger.fail(job_id, error).await,
        Outcome::TimedOut(error) => ledger.time_out(job_id, error).await,
    };
    match recorded {
        Ok(()) => info!(%project_id, %job_id, ?status, "job finished"),
        Err(err) => warn!(%project_id, %job_id, %err, "could not record job result"),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
