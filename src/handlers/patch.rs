//! Source patches applied with `patch -p1`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::download::http;
use crate::error::BuildError;
use crate::phase::{Phase, PhaseContext, PhaseHandler};
use crate::process::Cmd;
use crate::state::StateUpdate;

/// Where a patch body comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchSource {
    Url(String),
    File(PathBuf),
    Inline(String),
}

impl PatchSource {
    /// Classify a configured patch string: a URL, an existing file, or else
    /// the diff text itself.
    pub fn classify(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            PatchSource::Url(raw.to_string())
        } else if !raw.contains('\n') && Path::new(raw).is_file() {
            PatchSource::File(PathBuf::from(raw))
        } else {
            PatchSource::Inline(raw.to_string())
        }
    }

    fn describe(&self) -> String {
        match self {
            PatchSource::Url(url) => url.clone(),
            PatchSource::File(path) => path.display().to_string(),
            PatchSource::Inline(text) => {
                let first = text.lines().next().unwrap_or_default();
                format!("inline patch '{first}'")
            }
        }
    }

    fn load(&self) -> Result<Vec<u8>> {
        match self {
            PatchSource::Url(url) => http::fetch_bytes(url),
            PatchSource::File(path) => {
                fs::read(path).with_context(|| format!("reading patch '{}'", path.display()))
            }
            PatchSource::Inline(text) => Ok(text.as_bytes().to_vec()),
        }
    }
}

/// Applies a list of patches to the extracted source during one phase.
///
/// Status key: `patch_<phase>`, recorded beside the shared source so only the
/// first toolchain applies it. With an explicit `patch_root` the key lives in
/// the toolchain's own status file instead.
pub struct PatchHandler {
    phase: Phase,
    patches: Vec<PatchSource>,
    patch_root: Option<String>,
}

impl PatchHandler {
    pub fn new(phase: Phase, patches: &[String], patch_root: Option<String>) -> Self {
        Self {
            phase,
            patches: patches.iter().map(|p| PatchSource::classify(p)).collect(),
            patch_root,
        }
    }
}

impl PhaseHandler for PatchHandler {
    fn name(&self) -> &str {
        "patch"
    }

    fn phases(&self) -> Vec<Phase> {
        vec![self.phase]
    }

    fn run(&mut self, phase: Phase, ctx: &PhaseContext<'_>) -> Result<Option<StateUpdate>> {
        let unit = ctx.unit()?;
        let step = format!("patch_{phase}");
        let shared = if self.patch_root.is_some() {
            None
        } else {
            Some(unit.source_steps()?)
        };

        let done = match &shared {
            Some(steps) => steps.is_done(&step)?,
            None => unit.status.is_done(&step)?,
        };
        if done {
            info!(unit = %unit.unit, "{phase} patches already applied, skipping");
            return Ok(None);
        }

        let root = match &self.patch_root {
            Some(template) => PathBuf::from(ctx.render(template)?),
            None => unit.source()?.to_path_buf(),
        };
        let env = ctx.env()?;

        for (idx, patch) in self.patches.iter().enumerate() {
            let description = patch.describe();
            info!(unit = %unit.unit, "applying {description}");
            let body = patch.load()?;
            let log = unit.log(&format!("{step}_{}", idx + 1));

            let applied = Cmd::new("patch")
                .args(["-p1", "--batch"])
                .envs(&env)
                .current_dir(&root)
                .stdin(body)
                .log(&log)
                .run();

            if let Err(err) = applied {
                let rejected = matches!(
                    BuildError::find(&err),
                    Some(BuildError::Subprocess { .. })
                );
                if !rejected {
                    return Err(err);
                }
                return Err(BuildError::PatchApply {
                    unit: unit.unit.clone(),
                    patch: description,
                    log,
                }
                .into());
            }
        }

        match &shared {
            Some(steps) => steps.mark_done(&step)?,
            None => {
                unit.status.mark_done(&step)?;
            }
        }
        Ok(None)
    }
}
