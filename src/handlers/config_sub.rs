//! `config.sub` refresh for sources whose bundled copy predates the target.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use tracing::info;

use crate::download::http;
use crate::phase::{Phase, PhaseContext, PhaseHandler};
use crate::state::StateUpdate;

pub const CONFIG_SUB_URL: &str =
    "https://raw.githubusercontent.com/gcc-mirror/gcc/master/config.sub";

/// The `config.sub` payload, fetched at most once per process.
#[derive(Debug)]
pub struct ConfigSub {
    url: String,
    payload: OnceLock<Vec<u8>>,
}

impl ConfigSub {
    /// The process-wide instance backed by [`CONFIG_SUB_URL`].
    pub fn shared() -> Arc<ConfigSub> {
        static SHARED: OnceLock<Arc<ConfigSub>> = OnceLock::new();
        SHARED
            .get_or_init(|| Arc::new(ConfigSub::from_url(CONFIG_SUB_URL)))
            .clone()
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            payload: OnceLock::new(),
        }
    }

    /// An already-resolved payload.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let payload = OnceLock::new();
        let _ = payload.set(bytes.into());
        Self {
            url: String::new(),
            payload,
        }
    }

    pub fn payload(&self) -> Result<&[u8]> {
        if let Some(bytes) = self.payload.get() {
            return Ok(bytes);
        }
        info!("fetching config.sub from {}", self.url);
        let bytes = http::fetch_bytes(&self.url)?;
        Ok(self.payload.get_or_init(|| bytes))
    }
}

/// `post_extract` handler overwriting `<source>/<path>`. Status key:
/// `config_sub`, recorded beside the shared source.
pub struct ConfigSubHandler {
    path: String,
    config_sub: Arc<ConfigSub>,
}

impl ConfigSubHandler {
    pub fn new(path: impl Into<String>, config_sub: Arc<ConfigSub>) -> Self {
        Self {
            path: path.into(),
            config_sub,
        }
    }
}

impl PhaseHandler for ConfigSubHandler {
    fn name(&self) -> &str {
        "config_sub"
    }

    fn phases(&self) -> Vec<Phase> {
        vec![Phase::PostExtract]
    }

    fn run(&mut self, _phase: Phase, ctx: &PhaseContext<'_>) -> Result<Option<StateUpdate>> {
        let unit = ctx.unit()?;
        let steps = unit.source_steps()?;
        if steps.is_done("config_sub")? {
            info!(unit = %unit.unit, "{} already refreshed, skipping", self.path);
            return Ok(None);
        }

        let target = unit.source()?.join(&self.path);
        info!(unit = %unit.unit, "refreshing {}", target.display());
        fs::write(&target, self.config_sub.payload()?)
            .with_context(|| format!("writing '{}'", target.display()))?;
        fs::set_permissions(&target, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("marking '{}' executable", target.display()))?;

        steps.mark_done("config_sub")?;
        Ok(None)
    }
}
