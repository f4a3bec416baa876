use serde_json::json;

use super::*;

struct Echo;

#[async_trait]
impl EntryPoint for Echo {
    async fn call(&self, params: Parameters) -> Result<Value, UnitError> {
        Ok(Value::Object(params))
    }
}

struct Unavailable;

#[async_trait]
impl EntryPoint for Unavailable {
    async fn call(&self, _params: Parameters) -> Result<Value, UnitError> {
        Err(UnitError::failed("never called"))
    }

    fn locate(&self) -> Result<(), String> {
        Err("scripts/gone.py".to_string())
    }
}

#[test]
fn builtins_are_registered() {
    let table = UnitTable::with_builtins();
    for (module, function) in [
        ("calculator", "calculate"),
        ("password_generator", "generate_password"),
        ("password_generator", "generate_memorable_password"),
        ("qr_generator", "generate_qr"),
        ("web_link_extractor", "extract_links"),
    ] {
        assert!(table.contains(&UnitRef::new(module, function)), "{module}.{function}");
    }
}

#[test]
fn lookup_reports_missing_module_and_function() {
    let table = UnitTable::with_builtins();

    let err = table
        .lookup(&UnitRef::new("pdf_converter", "convert"))
        .err()
        .expect("module missing");
    assert_eq!(err, LookupError::UnitNotFound("pdf_converter".to_string()));
    assert_eq!(err.to_string(), "Module pdf_converter not found");

    let err = table
        .lookup(&UnitRef::new("calculator", "integrate"))
        .err()
        .expect("function missing");
    assert_eq!(
        err.to_string(),
        "Function integrate not found in module calculator"
    );
}

#[test]
fn unavailable_entry_point_is_unit_not_found() {
    let mut table = UnitTable::new();
    table.register("scripts", "gone", Unavailable);

    let err = table
        .lookup(&UnitRef::new("scripts", "gone"))
        .err()
        .expect("unavailable");
    assert_eq!(err, LookupError::UnitNotFound("scripts/gone.py".to_string()));
}

#[tokio::test]
async fn registered_entry_point_is_callable() {
    let mut table = UnitTable::new();
    table.register("echo", "call", Echo);

    let entry = table.lookup(&UnitRef::new("echo", "call")).expect("registered");
    let mut params = Parameters::new();
    params.insert("a".into(), json!(1));
    assert_eq!(entry.call(params).await.expect("echo"), json!({"a": 1}));
}

#[test]
fn parse_args_rejects_wrong_types() {
    #[derive(Debug, serde::Deserialize)]
    struct Args {
        #[allow(dead_code)]
        count: u32,
    }

    let mut params = Parameters::new();
    params.insert("count".into(), json!("three"));
    let err = parse_args::<Args>(params).expect_err("wrong type");
    assert!(matches!(err, UnitError::InvalidParameters(_)));
}
