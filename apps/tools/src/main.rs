use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use config::{Config, Environment, File};
use dispatch::{catalog, Dispatcher, JobLedger};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::protocol::Parameters;
use tracing_subscriber::EnvFilter;
use units::script::ScriptSpec;

/// Runs catalog projects in-process, without the HTTP server.
#[derive(Parser, Debug)]
struct Cli {
    /// Server configuration whose `scripts` join the built-in projects.
    #[arg(long, global = true, default_value = "server.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

/// The script-related part of the server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct ScriptSettings {
    scripts_dir: PathBuf,
    scripts: Vec<ScriptSpec>,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("scripts"),
            scripts: Vec::new(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every registered project.
    List,
    /// List the distinct project categories.
    Categories,
    /// Show one project's descriptor.
    Show { project_id: String },
    /// Invoke a project and print its result.
    Run {
        project_id: String,
        /// Parameter as key=value. Values that parse as JSON are passed typed.
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        /// Parameters as a JSON object; --param entries override its keys.
        #[arg(long)]
        json: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let dispatcher = build_dispatcher(&cli.config)?;

    match cli.command {
        Command::List => print_json(&dispatcher.registry().list_projects())?,
        Command::Categories => print_json(&dispatcher.registry().list_categories())?,
        Command::Show { project_id } => {
            print_json(dispatcher.registry().get(&project_id)?)?;
        }
        Command::Run {
            project_id,
            params,
            json,
        } => {
            let parameters = collect_parameters(json.as_deref(), &params)?;
            let result = dispatcher.invoke(&project_id, parameters).await?;
            print_json(&result)?;
            if !result.success {
                bail!("project {project_id} failed");
            }
        }
    }

    Ok(())
}

/// Same file and `APP__*` layering as the server, reading only the script keys.
fn load_scripts(file: &Path) -> Result<ScriptSettings> {
    Config::builder()
        .add_source(File::from(file).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("failed to read configuration from {}", file.display()))?
        .try_deserialize()
        .context("invalid script configuration")
}

fn build_dispatcher(config_file: &Path) -> Result<Dispatcher> {
    let settings = load_scripts(config_file)?;
    let (registry, units) = catalog::with_scripts(&settings.scripts_dir, &settings.scripts)
        .context("invalid project catalog")?;
    Ok(Dispatcher::new(
        Arc::new(registry),
        Arc::new(units),
        JobLedger::default(),
    ))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn collect_parameters(json: Option<&str>, pairs: &[String]) -> Result<Parameters> {
    let mut parameters = match json {
        Some(raw) => {
            let value: Value = serde_json::from_str(raw).context("--json is not valid JSON")?;
            match value {
                Value::Object(map) => map,
                _ => bail!("--json must be a JSON object"),
            }
        }
        None => Parameters::new(),
    };
    for pair in pairs {
        let (key, value) = parse_param(pair)?;
        parameters.insert(key, value);
    }
    Ok(parameters)
}

fn parse_param(pair: &str) -> Result<(String, Value)> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{pair}'"))?;
    if key.is_empty() {
        bail!("parameter name is empty in '{pair}'");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
