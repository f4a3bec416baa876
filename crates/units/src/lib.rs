//! Executable units and the table that registers them.
//!
//! Every project in the registry points at a `module.function` pair. The
//! [`UnitTable`] maps those pairs to [`EntryPoint`] implementations, built once
//! at startup. Leaf units report failures as [`UnitError`] values instead of
//! panicking or returning error-shaped JSON.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::domain::UnitRef;
use thiserror::Error;

pub mod calculator;
pub mod links;
pub mod password;
pub mod qr;
pub mod script;

pub use shared::protocol::Parameters;

#[derive(Debug, Error)]
pub enum UnitError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("{0}")]
    Failed(String),
    #[error("Script execution timed out")]
    TimedOut { elapsed_ms: u64 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UnitError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("Module {0} not found")]
    UnitNotFound(String),
    #[error("Function {function} not found in module {module}")]
    EntryPointMissing { module: String, function: String },
}

/// A single invocable function inside a unit.
#[async_trait]
pub trait EntryPoint: Send + Sync {
    async fn call(&self, params: Parameters) -> Result<Value, UnitError>;

    /// Confirms the resource backing this entry point exists. Returns the
    /// locator that could not be found otherwise.
    fn locate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Deserializes named parameters into a unit's typed argument struct.
pub fn parse_args<T: DeserializeOwned>(params: Parameters) -> Result<T, UnitError> {
    serde_json::from_value(Value::Object(params))
        .map_err(|err| UnitError::InvalidParameters(err.to_string()))
}

#[derive(Clone, Default)]
pub struct UnitTable {
    units: HashMap<String, HashMap<String, Arc<dyn EntryPoint>>>,
}

impl UnitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding every unit compiled into this crate.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table
            .register("calculator", "calculate", calculator::Calculate)
            .register(
                "password_generator",
                "generate_password",
                password::GeneratePassword,
            )
            .register(
                "password_generator",
                "generate_memorable_password",
                password::GenerateMemorablePassword,
            )
            .register("qr_generator", "generate_qr", qr::GenerateQr)
            .register(
                "web_link_extractor",
                "extract_links",
                links::ExtractLinks,
            );
        table
    }

    pub fn register(
        &mut self,
        module: impl Into<String>,
        function: impl Into<String>,
        entry_point: impl EntryPoint + 'static,
    ) -> &mut Self {
        self.units
            .entry(module.into())
            .or_default()
            .insert(function.into(), Arc::new(entry_point));
        self
    }

    pub fn lookup(&self, unit: &UnitRef) -> Result<Arc<dyn EntryPoint>, LookupError> {
        let functions = self
            .units
            .get(&unit.module)
            .ok_or_else(|| LookupError::UnitNotFound(unit.module.clone()))?;
        let entry_point = functions
            .get(&unit.function)
            .ok_or_else(|| LookupError::EntryPointMissing {
                module: unit.module.clone(),
                function: unit.function.clone(),
            })?;
        entry_point.locate().map_err(LookupError::UnitNotFound)?;
        Ok(Arc::clone(entry_point))
    }

    pub fn contains(&self, unit: &UnitRef) -> bool {
        self.units
            .get(&unit.module)
            .is_some_and(|functions| functions.contains_key(&unit.function))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
