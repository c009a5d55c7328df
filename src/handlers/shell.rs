//! Shell-command hooks.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::fsutil::ensure_dir;
use crate::phase::{Phase, PhaseContext, PhaseHandler};
use crate::process::Cmd;
use crate::state::StateUpdate;

/// Runs a templated `sh -c` command for each phase it is given.
///
/// Commands run in the unit's build directory once `configure` has produced
/// one, in the source directory before that, and in the toolchain prefix
/// before extraction. Status key: `shell_<phase>`; a command that runs in the
/// source directory is recorded beside the shared source, like a patch.
pub struct ShellHandler {
    commands: BTreeMap<Phase, String>,
}

impl ShellHandler {
    pub fn new(commands: BTreeMap<Phase, String>) -> Self {
        Self { commands }
    }

    fn working_dir(ctx: &PhaseContext<'_>) -> Result<PathBuf> {
        for key in ["build", "source"] {
            if ctx.state.contains(key) {
                return ctx.state.require_path(key);
            }
        }
        ctx.state.require_path("prefix_dir")
    }
}

impl PhaseHandler for ShellHandler {
    fn name(&self) -> &str {
        "shell"
    }

    fn phases(&self) -> Vec<Phase> {
        self.commands.keys().copied().collect()
    }

    fn run(&mut self, phase: Phase, ctx: &PhaseContext<'_>) -> Result<Option<StateUpdate>> {
        let Some(template) = self.commands.get(&phase) else {
            return Ok(None);
        };
        let unit = ctx.unit()?;
        let step = format!("shell_{phase}");
        let in_source = !ctx.state.contains("build") && ctx.state.contains("source");
        let shared = if in_source {
            Some(unit.source_steps()?)
        } else {
            None
        };

        let done = match &shared {
            Some(steps) => steps.is_done(&step)?,
            None => unit.status.is_done(&step)?,
        };
        if done {
            info!(unit = %unit.unit, "{phase} shell hook already ran, skipping");
            return Ok(None);
        }

        let command = ctx.render(template)?;
        let cwd = Self::working_dir(ctx)?;
        ensure_dir(&cwd)?;

        Cmd::shell(command)
            .envs(&ctx.env()?)
            .current_dir(cwd)
            .log(unit.log(&step))
            .error_msg(format!("{phase} shell hook for {} failed", unit.unit))
            .run()?;

        match &shared {
            Some(steps) => steps.mark_done(&step)?,
            None => {
                unit.status.mark_done(&step)?;
            }
        }
        Ok(None)
    }
}
