use std::{path::Path, path::PathBuf, time::Duration};

use anyhow::{ensure, Context};
use config::{Config, Environment, File, Map};
use dispatch::LedgerConfig;
use serde::Deserialize;
use units::script::ScriptSpec;

pub const CONFIG_FILE: &str = "server.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    pub log_filter: String,
    pub max_body_bytes: usize,
    pub call_timeout_secs: Option<u64>,
    pub scripts_dir: PathBuf,
    pub scripts: Vec<ScriptSpec>,
    pub ledger: LedgerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".into(),
            log_filter: "info".into(),
            max_body_bytes: 16 * 1024 * 1024,
            call_timeout_secs: None,
            scripts_dir: PathBuf::from("scripts"),
            scripts: Vec::new(),
            ledger: LedgerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub max_jobs: usize,
    pub job_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            max_jobs: dispatch::ledger::DEFAULT_MAX_JOBS,
            job_ttl_secs: dispatch::ledger::DEFAULT_JOB_TTL.as_secs(),
            sweep_interval_secs: 60,
        }
    }
}

impl Settings {
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            max_jobs: self.ledger.max_jobs,
            job_ttl: Duration::from_secs(self.ledger.job_ttl_secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.ledger.sweep_interval_secs)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.ledger.max_jobs > 0, "ledger.max_jobs must be at least 1");
        ensure!(
            self.ledger.sweep_interval_secs > 0,
            "ledger.sweep_interval_secs must be at least 1"
        );
        ensure!(self.max_body_bytes > 0, "max_body_bytes must be at least 1");
        Ok(())
    }
}

/// Defaults, then `server.toml`, then `APP__*` variables, then `SERVER_BIND`.
pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from(
        Path::new(CONFIG_FILE),
        None,
        std::env::var("SERVER_BIND").ok(),
    )
}

fn load_settings_from(
    file: &Path,
    env: Option<Map<String, String>>,
    legacy_bind: Option<String>,
) -> anyhow::Result<Settings> {
    let settings: Settings = Config::builder()
        .add_source(File::from(file).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .set_override_option("bind_addr", legacy_bind)?
        .build()
        .with_context(|| format!("failed to read configuration from {}", file.display()))?
        .try_deserialize()
        .context("invalid configuration")?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
