use std::sync::Arc;

use anyhow::Context;
use dispatch::{catalog, Dispatcher, JobLedger};

use crate::{api::ApiContext, config::Settings};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) max_body_bytes: usize,
}

impl AppState {
    /// Registers the built-in units plus every configured script.
    pub(crate) fn from_settings(settings: &Settings, ledger: JobLedger) -> anyhow::Result<Self> {
        let (registry, units) = catalog::with_scripts(&settings.scripts_dir, &settings.scripts)
            .context("invalid project catalog")?;

        let dispatcher = Dispatcher::new(Arc::new(registry), Arc::new(units), ledger)
            .with_call_timeout(settings.call_timeout());
        Ok(Self {
            api: ApiContext { dispatcher },
            max_body_bytes: settings.max_body_bytes,
        })
    }
}
