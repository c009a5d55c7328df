//! GNU autotools: `configure` then `make`.

use anyhow::Result;

use super::{BuildJob, BuildTool};
use crate::config::{ArgMap, BuildToolKind};
use crate::fsutil::{copy_tree, ensure_dir};

pub struct Autotools;

impl Autotools {
    pub fn default_args() -> ArgMap {
        ArgMap::new()
            .with("--prefix", "{prefix_dir}")
            .with("--host", "{target_triple}")
            .with("--build", "{parent_target_triple}")
    }
}

impl BuildTool for Autotools {
    fn kind(&self) -> BuildToolKind {
        BuildToolKind::Autotools
    }

    fn configure(&self, job: &BuildJob<'_>) -> Result<()> {
        let build = &job.unit.build;
        ensure_dir(build)?;

        // In-source builds run everything from a private copy of the tree.
        let script_dir = if job.config.in_source_build {
            let source = job.source_dir()?;
            job.step("clone", || copy_tree(&source, build))?;
            build.clone()
        } else {
            job.source_dir()?
        };

        let configure = script_dir.join("configure");
        let autogen = script_dir.join("autogen.sh");
        if !configure.is_file() && autogen.is_file() {
            job.step("autogen", || {
                job.cmd(autogen.display().to_string(), "autogen")
                    .current_dir(&script_dir)
                    .error_msg(format!("autogen.sh failed for {}", job.unit.unit))
                    .run()
            })?;
        }

        job.step("configure", || {
            let args = job.args(Self::default_args(), &job.config.configure_args)?;
            job.cmd(configure.display().to_string(), "configure")
                .args(args)
                .error_msg(format!("configure failed for {}", job.unit.unit))
                .run()
        })
    }

    fn build(&self, job: &BuildJob<'_>) -> Result<()> {
        job.make_build(&job.config.build_targets, &job.config.build_args)
    }

    fn install(&self, job: &BuildJob<'_>) -> Result<()> {
        job.make_install(&job.config.install_targets, &job.config.install_args)
    }
}
