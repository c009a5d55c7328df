//! User phase handlers: shell hooks, callbacks, patches and the config.sub
//! refresher.

pub mod callback;
pub mod config_sub;
pub mod patch;
pub mod shell;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;

pub use callback::{CallbackHandler, CallbackInput};
pub use config_sub::{ConfigSub, ConfigSubHandler};
pub use patch::{PatchHandler, PatchSource};
pub use shell::ShellHandler;

use crate::config::HookSpec;
use crate::phase::{Phase, PhaseHandler};

/// Instantiate the handler a hook spec describes.
pub fn from_spec(spec: &HookSpec, config_sub: &Arc<ConfigSub>) -> Result<Box<dyn PhaseHandler>> {
    Ok(match spec {
        HookSpec::Shell { commands } => {
            let commands = commands
                .iter()
                .map(|(phase, command)| Ok((phase.parse::<Phase>()?, command.clone())))
                .collect::<Result<BTreeMap<_, _>>>()?;
            Box::new(ShellHandler::new(commands))
        }
        HookSpec::Patch {
            phase,
            patches,
            patch_root,
        } => Box::new(PatchHandler::new(
            phase.parse()?,
            patches,
            patch_root.clone(),
        )),
        HookSpec::ConfigSub { path } => {
            Box::new(ConfigSubHandler::new(path.clone(), Arc::clone(config_sub)))
        }
    })
}
