use std::{
    collections::{BTreeMap, HashMap},
    str::FromStr,
};

use axum::http::StatusCode;
use dispatch::{DispatchError, Dispatcher, LedgerError};
use shared::{
    domain::{Job, JobId, JobStatus, ProjectDescriptor},
    error::{ApiError, ErrorCode},
    protocol::{
        CategoryListResponse, DeleteJobResponse, InvocationResult, ProjectListResponse,
        RunMode, RunProjectRequest, RunProjectResponse, ServiceInfo,
    },
};
use tracing::{info, warn};

pub const SERVICE_MESSAGE: &str = "Mini Projects API";

#[derive(Clone)]
pub struct ApiContext {
    pub dispatcher: Dispatcher,
}

pub fn service_info() -> ServiceInfo {
    ServiceInfo {
        message: SERVICE_MESSAGE.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

pub fn list_projects(ctx: &ApiContext) -> ProjectListResponse {
    let projects = ctx
        .dispatcher
        .registry()
        .list_projects()
        .iter()
        .map(|project| (project.id.to_string(), project.clone()))
        .collect::<BTreeMap<_, _>>();
    ProjectListResponse {
        total: projects.len(),
        projects,
    }
}

pub fn get_project(ctx: &ApiContext, project_id: &str) -> Result<ProjectDescriptor, ApiError> {
    ctx.dispatcher
        .registry()
        .get(project_id)
        .cloned()
        .map_err(|_| ApiError::not_found("Project not found"))
}

pub fn list_categories(ctx: &ApiContext) -> CategoryListResponse {
    let categories: Vec<String> = ctx
        .dispatcher
        .registry()
        .list_categories()
        .into_iter()
        .collect();
    CategoryListResponse {
        total: categories.len(),
        categories,
    }
}

/// Runs a project inline or on a background task, depending on the
/// request's mode.
pub async fn run_project(
    ctx: &ApiContext,
    project_id: &str,
    req: RunProjectRequest,
) -> Result<(RunMode, RunProjectResponse), ApiError> {
    if let Some(body_id) = req.project_id.as_deref() {
        if body_id != project_id {
            return Err(ApiError::new(
                ErrorCode::Validation,
                format!("body project_id '{body_id}' does not match path '{project_id}'"),
            ));
        }
    }

    match req.mode {
        RunMode::Sync => {
            let response = ctx
                .dispatcher
                .run(project_id, req.parameters)
                .await
                .map_err(dispatch_error)?;
            Ok((RunMode::Sync, response))
        }
        RunMode::Background => {
            let job_id = ctx
                .dispatcher
                .submit(project_id, req.parameters)
                .await
                .map_err(dispatch_error)?;
            Ok((
                RunMode::Background,
                RunProjectResponse {
                    outcome: InvocationResult::accepted(),
                    job_id,
                    status: JobStatus::Running,
                },
            ))
        }
    }
}

pub async fn get_job(ctx: &ApiContext, job_id: &str) -> Result<Job, ApiError> {
    let job_id = parse_job_id(job_id)?;
    ctx.dispatcher
        .ledger()
        .get(job_id)
        .await
        .map_err(ledger_error)
}

pub async fn list_jobs(ctx: &ApiContext) -> HashMap<JobId, Job> {
    ctx.dispatcher.ledger().list_all().await
}

pub async fn delete_job(ctx: &ApiContext, job_id: &str) -> Result<DeleteJobResponse, ApiError> {
    let job_id = parse_job_id(job_id)?;
    ctx.dispatcher
        .ledger()
        .delete(job_id)
        .await
        .map_err(ledger_error)?;
    info!(%job_id, "job deleted");
    Ok(DeleteJobResponse {
        message: "Job deleted successfully".to_string(),
    })
}

/// HTTP status for an error envelope.
pub fn status_for(err: &ApiError) -> StatusCode {
    match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    JobId::from_str(raw).map_err(|_| ApiError::not_found("Job not found"))
}

fn dispatch_error(err: DispatchError) -> ApiError {
    match err {
        DispatchError::ProjectNotFound(_) => ApiError::not_found("Project not found"),
        DispatchError::UnitNotFound(_) | DispatchError::EntryPointMissing { .. } => {
            warn!(%err, "project is registered but cannot be executed");
            ApiError::internal(err.to_string())
        }
        DispatchError::Ledger(err) => ledger_error(err),
    }
}

fn ledger_error(err: LedgerError) -> ApiError {
    match err {
        LedgerError::NotFound(_) => ApiError::not_found("Job not found"),
        LedgerError::Full => ApiError::new(ErrorCode::Unavailable, err.to_string()),
        LedgerError::AlreadyFinished { .. } => ApiError::internal(err.to_string()),
    }
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
