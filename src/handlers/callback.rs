//! In-process callback hooks.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;

use anyhow::{Context, Result};
use tracing::info;

use crate::error::BuildError;
use crate::fsutil::ensure_dir;
use crate::phase::{Phase, PhaseContext, PhaseHandler};
use crate::state::{BuildState, StateUpdate};
use crate::status::StatusFile;

/// What a callback receives.
pub struct CallbackInput<'a> {
    /// Library environment with overrides rendered.
    pub env: BTreeMap<String, String>,
    pub state: &'a BuildState,
    /// The step's log file, already opened for writing.
    pub log: &'a mut File,
}

pub type Callback = Box<dyn FnMut(CallbackInput<'_>) -> Result<Option<StateUpdate>>>;

/// Runs Rust closures bound to phases. Status key: `hook_<phase>`.
///
/// A callback's returned update is stored next to its flag under
/// `hook_<phase>_update` and handed back again whenever the callback itself
/// is skipped, so later phases see the same state on a resumed build.
pub struct CallbackHandler {
    callbacks: BTreeMap<Phase, Callback>,
}

impl CallbackHandler {
    pub fn new() -> Self {
        Self {
            callbacks: BTreeMap::new(),
        }
    }

    pub fn on<F>(mut self, phase: Phase, callback: F) -> Self
    where
        F: FnMut(CallbackInput<'_>) -> Result<Option<StateUpdate>> + 'static,
    {
        self.callbacks.insert(phase, Box::new(callback));
        self
    }
}

impl Default for CallbackHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseHandler for CallbackHandler {
    fn name(&self) -> &str {
        "callback"
    }

    fn phases(&self) -> Vec<Phase> {
        self.callbacks.keys().copied().collect()
    }

    fn run(&mut self, phase: Phase, ctx: &PhaseContext<'_>) -> Result<Option<StateUpdate>> {
        let Some(callback) = self.callbacks.get_mut(&phase) else {
            return Ok(None);
        };
        let unit = ctx.unit()?;
        let step = format!("hook_{phase}");

        let update_key = format!("{step}_update");

        if unit.status.is_done(&step)? {
            info!(unit = %unit.unit, "{phase} callback already ran, skipping");
            return stored_update(&unit.status, &update_key);
        }

        ensure_dir(&unit.logs)?;
        let log_path = unit.log(&step);
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| BuildError::Filesystem {
                path: log_path.clone(),
                reason: e.to_string(),
            })?;
        writeln!(log, "# {phase} callback for {}", unit.unit)?;

        let input = CallbackInput {
            env: ctx.env()?,
            state: ctx.state,
            log: &mut log,
        };
        match callback(input) {
            Ok(update) => {
                let mut record = vec![(step, serde_json::Value::Bool(true))];
                if let Some(update) = &update {
                    let value = serde_json::to_value(update)
                        .with_context(|| format!("recording {phase} callback output"))?;
                    record.push((update_key, value));
                }
                unit.status.merge(record)?;
                Ok(update)
            }
            Err(err) => {
                writeln!(log, "\nerror: {err:#}")?;
                Err(err).with_context(|| {
                    format!(
                        "{phase} callback for {} failed, see log: {}",
                        unit.unit,
                        log_path.display()
                    )
                })
            }
        }
    }
}

fn stored_update(status: &StatusFile, key: &str) -> Result<Option<StateUpdate>> {
    let Some(value) = status.get(key)? else {
        return Ok(None);
    };
    let update = serde_json::from_value(value).map_err(|e| BuildError::StatusStore {
        path: status.path().to_path_buf(),
        reason: format!("{key}: {e}"),
    })?;
    Ok(Some(update))
}
