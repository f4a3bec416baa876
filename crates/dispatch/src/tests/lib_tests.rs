use async_trait::async_trait;
use serde_json::json;
use shared::domain::{ProjectDescriptor, UnitRef};

use super::*;

struct Echo;

#[async_trait]
impl EntryPoint for Echo {
    async fn call(&self, params: Parameters) -> Result<Value, UnitError> {
        Ok(Value::Object(params))
    }
}

struct Boom;

#[async_trait]
impl EntryPoint for Boom {
    async fn call(&self, _params: Parameters) -> Result<Value, UnitError> {
        Err(UnitError::failed("boom"))
    }
}

struct Slow;

#[async_trait]
impl EntryPoint for Slow {
    async fn call(&self, _params: Parameters) -> Result<Value, UnitError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Value::Null)
    }
}

struct Panicky;

#[async_trait]
impl EntryPoint for Panicky {
    async fn call(&self, params: Parameters) -> Result<Value, UnitError> {
        match params.get("owned") {
            Some(Value::Bool(true)) => panic!("{} went wrong", "something"),
            _ => panic!("unit blew up"),
        }
    }
}

fn dispatcher() -> Dispatcher {
    let registry = Registry::new(vec![
        ProjectDescriptor::new("echo", "Echo", "Testing", UnitRef::new("test", "echo")),
        ProjectDescriptor::new("boom", "Boom", "Testing", UnitRef::new("test", "boom")),
        ProjectDescriptor::new("slow", "Slow", "Testing", UnitRef::new("test", "slow")),
        ProjectDescriptor::new("panicky", "Panicky", "Testing", UnitRef::new("test", "panicky")),
        ProjectDescriptor::new("orphan", "Orphan", "Testing", UnitRef::new("missing", "run")),
        ProjectDescriptor::new("partial", "Partial", "Testing", UnitRef::new("test", "absent")),
    ])
    .expect("registry");

    let mut units = UnitTable::new();
    units
        .register("test", "echo", Echo)
        .register("test", "boom", Boom)
        .register("test", "slow", Slow)
        .register("test", "panicky", Panicky);

    Dispatcher::new(Arc::new(registry), Arc::new(units), JobLedger::default())
}

fn params(value: Value) -> Parameters {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

#[tokio::test]
async fn invoke_wraps_callee_value() {
    let result = dispatcher()
        .invoke("echo", params(json!({"x": 1})))
        .await
        .expect("invoke");
    assert_eq!(result, InvocationResult::ok(json!({"x": 1})));
}

#[tokio::test]
async fn invoke_reports_callee_failure_as_unsuccessful() {
    let result = dispatcher()
        .invoke("boom", Parameters::new())
        .await
        .expect("invoke");
    assert_eq!(result, InvocationResult::failed("boom"));
}

#[tokio::test]
async fn resolution_errors_are_distinguished() {
    let dispatcher = dispatcher();

    assert_eq!(
        dispatcher.invoke("nonexistent", Parameters::new()).await,
        Err(DispatchError::ProjectNotFound("nonexistent".to_string()))
    );
    assert_eq!(
        dispatcher.invoke("orphan", Parameters::new()).await,
        Err(DispatchError::UnitNotFound("missing".to_string()))
    );
    assert_eq!(
        dispatcher.invoke("partial", Parameters::new()).await,
        Err(DispatchError::EntryPointMissing {
            module: "test".to_string(),
            function: "absent".to_string(),
        })
    );
}

#[tokio::test]
async fn run_records_completed_job() {
    let dispatcher = dispatcher();
    let response = dispatcher
        .run("echo", params(json!({"x": 2})))
        .await
        .expect("run");

    assert_eq!(response.status, JobStatus::Completed);
    assert!(response.outcome.success);

    let job = dispatcher.ledger().get(response.job_id).await.expect("job");
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.project_id.as_str(), "echo");
    assert_eq!(job.result, Some(json!({"x": 2})));
}

#[tokio::test]
async fn run_records_failed_job() {
    let dispatcher = dispatcher();
    let response = dispatcher.run("boom", Parameters::new()).await.expect("run");

    assert_eq!(response.status, JobStatus::Failed);
    assert_eq!(response.outcome.error.as_deref(), Some("boom"));

    let job = dispatcher.ledger().get(response.job_id).await.expect("job");
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("boom"));
}

#[tokio::test]
async fn run_on_unknown_project_creates_no_job() {
    let dispatcher = dispatcher();
    let err = dispatcher
        .run("nonexistent", Parameters::new())
        .await
        .expect_err("unknown project");
    assert_eq!(err, DispatchError::ProjectNotFound("nonexistent".to_string()));
    assert_eq!(dispatcher.ledger().len().await, 0);
}

#[tokio::test(start_paused = true)]
async fn call_timeout_marks_job_timed_out() {
    let dispatcher = dispatcher().with_call_timeout(Some(Duration::from_millis(50)));
    let response = dispatcher.run("slow", Parameters::new()).await.expect("run");

    assert_eq!(response.status, JobStatus::TimedOut);
    assert!(!response.outcome.success);
    assert_eq!(
        response.outcome.error.as_deref(),
        Some("Script execution timed out")
    );
}

#[tokio::test]
async fn submit_finishes_in_background() {
    let dispatcher = dispatcher();
    let job_id = dispatcher
        .submit("echo", params(json!({"y": true})))
        .await
        .expect("submit");

    let mut job = dispatcher.ledger().get(job_id).await.expect("job");
    for _ in 0..100 {
        if job.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        job = dispatcher.ledger().get(job_id).await.expect("job");
    }
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result, Some(json!({"y": true})));
}

#[tokio::test]
async fn full_ledger_rejects_runs() {
    let registry = Registry::new(vec![ProjectDescriptor::new(
        "slow",
        "Slow",
        "Testing",
        UnitRef::new("test", "slow"),
    )])
    .expect("registry");
    let mut units = UnitTable::new();
    units.register("test", "slow", Slow);
    let dispatcher = Dispatcher::new(
        Arc::new(registry),
        Arc::new(units),
        JobLedger::new(LedgerConfig {
            max_jobs: 1,
            ..LedgerConfig::default()
        }),
    );

    dispatcher
        .submit("slow", Parameters::new())
        .await
        .expect("first job fits");
    assert_eq!(
        dispatcher.submit("slow", Parameters::new()).await,
        Err(DispatchError::Ledger(LedgerError::Full))
    );
}

#[tokio::test]
async fn panicking_unit_fails_its_run() {
    let dispatcher = dispatcher();
    let response = dispatcher
        .run("panicky", Parameters::new())
        .await
        .expect("run");

    assert_eq!(response.status, JobStatus::Failed);
    assert_eq!(
        response.outcome.error.as_deref(),
        Some("unit panicked: unit blew up")
    );
    let job = dispatcher.ledger().get(response.job_id).await.expect("job");
    assert_eq!(job.status, JobStatus::Failed);

    let result = dispatcher
        .invoke("panicky", params(json!({"owned": true})))
        .await
        .expect("invoke");
    assert_eq!(
        result,
        InvocationResult::failed("unit panicked: something went wrong")
    );
}

#[tokio::test]
async fn panicking_background_job_reaches_failed() {
    let dispatcher = dispatcher();
    let job_id = dispatcher
        .submit("panicky", Parameters::new())
        .await
        .expect("submit");

    let mut job = dispatcher.ledger().get(job_id).await.expect("job");
    for _ in 0..100 {
        if job.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        job = dispatcher.ledger().get(job_id).await.expect("job");
    }
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("unit panicked: unit blew up"));
}
