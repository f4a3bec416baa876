//! External script runner.
//!
//! Each configured [`ScriptSpec`] becomes a project in the `scripts` module.
//! Calling it spawns `interpreter <file> <args..>` inside the scripts
//! directory, where the positional arguments follow the declared parameter
//! order.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::domain::{ParameterSpec, ProjectDescriptor, UnitRef};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{EntryPoint, Parameters, UnitError};

pub const SCRIPTS_MODULE: &str = "scripts";
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(300);

fn default_category() -> String {
    "Scripts".to_string()
}

fn default_interpreter() -> String {
    "python3".to_string()
}

/// Operator-declared script project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    /// Path relative to the scripts directory.
    pub file: String,
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ScriptSpec {
    pub fn descriptor(&self) -> ProjectDescriptor {
        let mut descriptor = ProjectDescriptor::new(
            self.id.as_str(),
            self.name.as_str(),
            self.category.as_str(),
            UnitRef::new(SCRIPTS_MODULE, self.id.as_str()),
        )
        .description(self.description.as_str());
        descriptor.parameters = self.parameters.clone();
        descriptor
    }

    pub fn entry_point(&self, scripts_dir: &Path, default_timeout: Duration) -> ScriptEntryPoint {
        ScriptEntryPoint {
            interpreter: self.interpreter.clone(),
            scripts_dir: scripts_dir.to_path_buf(),
            file: PathBuf::from(&self.file),
            parameters: self.parameters.iter().map(|p| p.name.clone()).collect(),
            timeout: self
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(default_timeout),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptEntryPoint {
    interpreter: String,
    scripts_dir: PathBuf,
    file: PathBuf,
    parameters: Vec<String>,
    timeout: Duration,
}

impl ScriptEntryPoint {
    fn script_path(&self) -> PathBuf {
        self.scripts_dir.join(&self.file)
    }

    /// Positional arguments in declared parameter order. Missing, null and
    /// empty-string values are skipped.
    fn arguments(&self, params: &Parameters) -> Vec<String> {
        self.parameters
            .iter()
            .filter_map(|name| match params.get(name)? {
                Value::Null => None,
                Value::String(s) if s.is_empty() => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect()
    }
}

#[async_trait]
impl EntryPoint for ScriptEntryPoint {
    async fn call(&self, params: Parameters) -> Result<Value, UnitError> {
        let args = self.arguments(&params);
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&self.file)
            .args(&args)
            .current_dir(&self.scripts_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(script = %self.file.display(), ?args, "spawning script");
        let start = Instant::now();
        let child = cmd.spawn()?;

        // Dropping the pending wait on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                warn!(script = %self.file.display(), elapsed_ms, "script timed out");
                return Err(UnitError::TimedOut { elapsed_ms });
            }
        };

        Ok(json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "return_code": output.status.code().unwrap_or(-1),
            "duration_ms": start.elapsed().as_millis() as u64,
        }))
    }

    fn locate(&self) -> Result<(), String> {
        let path = self.script_path();
        if path.is_file() {
            Ok(())
        } else {
            Err(path.display().to_string())
        }
    }
}

#[cfg(test)]
#[path = "tests/script_tests.rs"]
mod tests;
