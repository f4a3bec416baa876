use std::path::PathBuf;

use super::*;

fn script(id: &str) -> ScriptSpec {
    ScriptSpec {
        id: id.to_string(),
        name: format!("Script {id}"),
        description: String::new(),
        category: "Scripts".to_string(),
        file: format!("{id}.py"),
        interpreter: "python3".to_string(),
        parameters: Vec::new(),
        timeout_secs: None,
    }
}

#[test]
fn builtins_only_without_scripts() {
    let (registry, units) = with_scripts(Path::new("scripts"), &[]).expect("catalog");
    assert_eq!(registry.len(), builtin_catalog().len());
    for project in registry.list_projects() {
        assert!(units.contains(&project.unit), "{}", project.id);
    }
}

#[test]
fn scripts_join_the_builtins() {
    let dir = PathBuf::from("/opt/scripts");
    let (registry, units) =
        with_scripts(&dir, &[script("backup"), script("report")]).expect("catalog");

    assert_eq!(registry.len(), builtin_catalog().len() + 2);
    let backup = registry.get("backup").expect("backup registered");
    assert_eq!(backup.unit, UnitRef::new(SCRIPTS_MODULE, "backup"));
    assert_eq!(backup.category, "Scripts");
    assert!(units.contains(&UnitRef::new(SCRIPTS_MODULE, "report")));
    assert!(registry.list_categories().contains("Scripts"));
}

#[test]
fn repeated_script_ids_are_rejected() {
    let err = with_scripts(Path::new("scripts"), &[script("backup"), script("backup")])
        .err()
        .expect("duplicate script");
    assert_eq!(err, CatalogError::DuplicateScript("backup".into()));
}

#[test]
fn script_shadowing_a_builtin_is_rejected() {
    let err = with_scripts(Path::new("scripts"), &[script("calculator")])
        .err()
        .expect("shadowed built-in");
    assert_eq!(err, CatalogError::ShadowsBuiltin("calculator".into()));
    assert_eq!(
        err.to_string(),
        "script 'calculator' has the id of a built-in project"
    );
}
