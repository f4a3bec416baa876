//! Assembles the built-in catalog plus operator-declared scripts, shared by
//! every front end that runs projects.

use std::path::Path;

use registry::{builtin_catalog, Registry, RegistryError};
use shared::domain::UnitRef;
use thiserror::Error;
use units::{
    script::{ScriptSpec, DEFAULT_SCRIPT_TIMEOUT, SCRIPTS_MODULE},
    UnitTable,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("script '{0}' is declared more than once")]
    DuplicateScript(String),
    #[error("script '{0}' has the id of a built-in project")]
    ShadowsBuiltin(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Registry and unit table holding the built-ins and every script in `scripts`.
pub fn with_scripts(
    scripts_dir: &Path,
    scripts: &[ScriptSpec],
) -> Result<(Registry, UnitTable), CatalogError> {
    let builtins = Registry::builtin()?;
    let mut projects = builtin_catalog();
    let mut units = UnitTable::with_builtins();
    for script in scripts {
        if builtins.contains(&script.id) {
            return Err(CatalogError::ShadowsBuiltin(script.id.clone()));
        }
        // Registering twice would silently replace the first entry point.
        if units.contains(&UnitRef::new(SCRIPTS_MODULE, script.id.as_str())) {
            return Err(CatalogError::DuplicateScript(script.id.clone()));
        }
        projects.push(script.descriptor());
        units.register(
            SCRIPTS_MODULE,
            script.id.clone(),
            script.entry_point(scripts_dir, DEFAULT_SCRIPT_TIMEOUT),
        );
    }
    Ok((Registry::new(projects)?, units))
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
