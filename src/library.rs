//! One library unit and its phase pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::LibraryConfig;
use crate::download::SmartDownload;
use crate::drivers::SmartBuild;
use crate::extract::SmartExtract;
use crate::handlers::{self, ConfigSub};
use crate::phase::{BindingTable, Phase, PhaseContext, PhaseHandler};
use crate::state::BuildState;

/// A library registered with a toolchain.
///
/// Handlers register in order: smart download, smart extract, smart build,
/// then the configured hooks, then anything added with
/// [`Library::with_handler`]. The last handler declaring a phase runs it.
pub struct Library {
    config: LibraryConfig,
    env: Arc<BTreeMap<String, String>>,
    handlers: Vec<Box<dyn PhaseHandler>>,
}

impl Library {
    /// `env` is the environment the library's commands run under: the owning
    /// toolchain's, or its parent's for bootstrap tools.
    pub fn new(
        config: LibraryConfig,
        env: Arc<BTreeMap<String, String>>,
        config_sub: &Arc<ConfigSub>,
    ) -> Result<Self> {
        config.validate()?;

        let mut handlers: Vec<Box<dyn PhaseHandler>> = vec![
            Box::new(SmartDownload::new(config.url.clone(), config.sha256.clone())),
            Box::new(SmartExtract),
            Box::new(SmartBuild::new(config.clone())),
        ];
        for hook in &config.hooks {
            handlers.push(
                handlers::from_spec(hook, config_sub)
                    .with_context(|| format!("library '{}'", config.name))?,
            );
        }

        Ok(Self {
            config,
            env,
            handlers,
        })
    }

    pub fn with_handler(mut self, handler: impl PhaseHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Name plus build postfix, as shown in listings.
    pub fn label(&self) -> String {
        format!("{}{}", self.config.name, self.config.build_postfix)
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    /// Name of the handler bound to `phase`, if any.
    pub fn bound_handler(&self, phase: Phase) -> Option<&str> {
        BindingTable::new(&self.handlers)
            .bound(phase)
            .map(|idx| self.handlers[idx].name())
    }

    /// Run every bound phase in order, starting from `toolchain_state`.
    ///
    /// Returns the final state. The first failing phase aborts the library
    /// with the phase and library named in the error.
    pub fn build(&mut self, toolchain_state: &BuildState) -> Result<BuildState> {
        let toolchain = toolchain_state
            .get("toolchain_name")
            .map(|v| v.to_string())
            .unwrap_or_default();
        info!(library = %self.label(), toolchain = %toolchain, "building library");

        let table = BindingTable::new(&self.handlers);
        let mut state = toolchain_state.clone();

        for phase in Phase::ALL {
            let Some(idx) = table.bound(phase) else {
                continue;
            };
            let handler = &mut self.handlers[idx];
            debug!(library = %self.config.name, %phase, handler = handler.name(), "running phase");

            let ctx = PhaseContext::new(
                &self.config.name,
                &self.config.build_postfix,
                &state,
                &self.env,
                &self.config.env,
            );
            let update = handler
                .run(phase, &ctx)
                .with_context(|| format!("{phase} failed for library '{}'", self.config.name))?;
            if let Some(update) = update {
                state.merge(update);
            }
        }

        Ok(state)
    }
}
