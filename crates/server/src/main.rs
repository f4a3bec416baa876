use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dispatch::JobLedger;
use shared::{
    domain::{Job, JobId, ProjectDescriptor},
    error::{ApiError, ErrorCode},
    protocol::{
        CategoryListResponse, DeleteJobResponse, ProjectListResponse, RunMode, RunProjectRequest,
        ServiceInfo,
    },
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;

use crate::app_state::AppState;
use crate::config::load_settings;

type HttpError = (StatusCode, Json<ApiError>);

const ALLOWED_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .init();

    let ledger = JobLedger::new(settings.ledger_config());
    let state = AppState::from_settings(&settings, ledger.clone())?;
    let _sweeper = ledger.spawn_sweeper(settings.sweep_interval());

    let projects = state.api.dispatcher.registry().len();
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.bind_addr))?;
    info!(%addr, projects, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let projects = Router::new()
        .route("/projects", get(http_list_projects))
        .route("/projects/:project_id", get(http_get_project))
        .route("/projects/:project_id/run", post(http_run_project));

    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/categories", get(http_list_categories))
        .route("/jobs", get(http_list_jobs))
        .route("/jobs/:job_id", get(http_get_job).delete(http_delete_job))
        .merge(projects.clone())
        .nest("/api", projects)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.max_body_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(ALLOWED_METHODS)
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(middleware::from_fn(preflight))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Answers every `OPTIONS` request directly, with or without an `Origin`.
async fn preflight(request: Request, next: Next) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }
    (
        StatusCode::OK,
        [
            (
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Content-Type"),
            ),
        ],
    )
        .into_response()
}

fn http_error(err: ApiError) -> HttpError {
    (api::status_for(&err), Json(err))
}

async fn root() -> Json<ServiceInfo> {
    Json(api::service_info())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_list_projects(State(state): State<Arc<AppState>>) -> Json<ProjectListResponse> {
    Json(api::list_projects(&state.api))
}

async fn http_get_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectDescriptor>, HttpError> {
    api::get_project(&state.api, &project_id)
        .map(Json)
        .map_err(http_error)
}

async fn http_list_categories(State(state): State<Arc<AppState>>) -> Json<CategoryListResponse> {
    Json(api::list_categories(&state.api))
}

async fn http_run_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    body: Result<Json<RunProjectRequest>, JsonRejection>,
) -> Result<Response, HttpError> {
    let Json(req) = body.map_err(|rejection| {
        (
            rejection.status(),
            Json(ApiError::new(ErrorCode::Validation, rejection.body_text())),
        )
    })?;
    let (mode, response) = api::run_project(&state.api, &project_id, req)
        .await
        .map_err(http_error)?;
    let status = match mode {
        RunMode::Sync => StatusCode::OK,
        RunMode::Background => StatusCode::ACCEPTED,
    };
    Ok((status, Json(response)).into_response())
}

async fn http_list_jobs(State(state): State<Arc<AppState>>) -> Json<HashMap<JobId, Job>> {
    Json(api::list_jobs(&state.api).await)
}

async fn http_get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, HttpError> {
    api::get_job(&state.api, &job_id)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_delete_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<DeleteJobResponse>, HttpError> {
    api::delete_job(&state.api, &job_id)
        .await
        .map(Json)
        .map_err(http_error)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
