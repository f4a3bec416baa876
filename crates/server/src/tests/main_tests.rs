use super::*;
use axum::{body, body::Body, http::Request};
use serde_json::{json, Value};
use tower::ServiceExt;
use units::script::ScriptSpec;

use crate::config::Settings;

fn test_app_with(settings: Settings) -> Router {
    let state = AppState::from_settings(&settings, JobLedger::default()).expect("state");
    build_router(Arc::new(state))
}

fn test_app() -> Router {
    test_app_with(Settings::default())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, value)
}

fn get_request(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request")
}

fn run_request(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn healthz_and_root_respond() {
    let app = test_app();

    let (status, body) = send(&app, get_request("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("ok"));

    let (status, body) = send(&app, get_request("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], api::SERVICE_MESSAGE);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn projects_are_listed_under_both_prefixes() {
    let app = test_app();
    for uri in ["/projects", "/api/projects"] {
        let (status, body) = send(&app, get_request(uri)).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body["total"], 5);
        assert_eq!(body["projects"]["calculator"]["module"], "calculator");
        assert_eq!(body["projects"]["calculator"]["function"], "calculate");
    }

    let (status, body) = send(&app, get_request("/api/projects/password_generator")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], "Security");
}

#[tokio::test]
async fn unknown_project_is_404() {
    let app = test_app();
    let (status, body) = send(&app, get_request("/projects/nonexistent")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn categories_are_sorted_and_unique() {
    let (status, body) = send(&test_app(), get_request("/categories")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["categories"], json!(["Security", "Utility", "Web"]));
    assert_eq!(body["total"], 3);
}

#[tokio::test]
async fn sync_run_returns_result_and_tracks_job() {
    let app = test_app();
    let (status, body) = send(
        &app,
        run_request(
            "/projects/calculator/run",
            json!({"parameters": {"expression": "2+2"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(
        body["result"],
        json!({"expression": "2+2", "result": 4, "type": "int"})
    );
    assert_eq!(body["status"], "completed");

    let job_id = body["job_id"].as_str().expect("job id");
    let (status, job) = send(&app, get_request(&format!("/jobs/{job_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "completed");
    assert_eq!(job["project_id"], "calculator");
}

#[tokio::test]
async fn callee_failure_is_200_with_success_false() {
    let app = test_app();
    let (status, body) = send(
        &app,
        run_request(
            "/api/projects/calculator/run",
            json!({"parameters": {"expression": "1/0"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["status"], "failed");
    assert!(body["error"]
        .as_str()
        .expect("error")
        .contains("division"));
}

#[tokio::test]
async fn unknown_project_run_is_404_and_creates_no_job() {
    let app = test_app();
    let (status, body) = send(
        &app,
        run_request("/projects/nonexistent/run", json!({"parameters": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (_, jobs) = send(&app, get_request("/jobs")).await;
    assert_eq!(jobs, json!({}));
}

#[tokio::test]
async fn invalid_run_bodies_are_400() {
    let app = test_app();

    let (status, body) = send(
        &app,
        run_request(
            "/projects/calculator/run",
            json!({"project_id": "password_generator", "parameters": {}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let malformed = Request::post("/projects/calculator/run")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .expect("request");
    let (status, body) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
}

#[tokio::test]
async fn background_run_is_accepted_and_completes() {
    let app = test_app();
    let (status, body) = send(
        &app,
        run_request(
            "/projects/memorable_password/run",
            json!({"mode": "background", "parameters": {"word_count": 3}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "running");

    let uri = format!("/jobs/{}", body["job_id"].as_str().expect("job id"));
    let mut job = Value::Null;
    for _ in 0..100 {
        let (status, current) = send(&app, get_request(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        job = current;
        if job["status"] != "running" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(job["status"], "completed");
    assert_eq!(job["result"]["type"], "memorable");
}

#[tokio::test]
async fn job_lookup_and_delete() {
    let app = test_app();

    let (status, _) = send(&app, get_request("/jobs/not-a-uuid")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(
        &app,
        run_request(
            "/projects/calculator/run",
            json!({"parameters": {"expression": "3*3"}}),
        ),
    )
    .await;
    let uri = format!("/jobs/{}", body["job_id"].as_str().expect("job id"));

    let (_, jobs) = send(&app, get_request("/jobs")).await;
    assert_eq!(jobs.as_object().map(|jobs| jobs.len()), Some(1));

    let delete = || Request::delete(uri.as_str()).body(Body::empty()).expect("request");
    let (status, body) = send(&app, delete()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Job deleted successfully");

    let (status, body) = send(&app, delete()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = send(&app, get_request(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn options_requests_get_cors_headers() {
    let app = test_app();
    let request = Request::options("/anything/at/all")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
    let methods = response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .expect("header");
    assert!(methods.contains("DELETE"));
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert!(bytes.is_empty());

    let request = Request::get("/healthz")
        .header(header::ORIGIN, "http://localhost:3000")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}

#[tokio::test]
async fn missing_script_file_is_internal_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app_with(Settings {
        scripts_dir: dir.path().to_path_buf(),
        scripts: vec![ScriptSpec {
            id: "cleanup".to_string(),
            name: "Cleanup".to_string(),
            description: String::new(),
            category: "Scripts".to_string(),
            file: "cleanup.py".to_string(),
            interpreter: "python3".to_string(),
            parameters: Vec::new(),
            timeout_secs: None,
        }],
        ..Settings::default()
    });

    let (status, body) = send(&app, get_request("/projects/cleanup")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["module"], "scripts");

    let (status, body) = send(
        &app,
        run_request("/projects/cleanup/run", json!({"parameters": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "internal");
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let app = test_app_with(Settings {
        max_body_bytes: 64,
        ..Settings::default()
    });
    let expression = "1+".repeat(100) + "1";
    let (status, _) = send(
        &app,
        run_request(
            "/projects/calculator/run",
            json!({"parameters": {"expression": expression}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}
