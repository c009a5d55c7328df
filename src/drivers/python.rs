//! Python `setup.py` packages built against the toolchain's own interpreter.

use anyhow::Result;

use super::{BuildJob, BuildTool};
use crate::config::{ArgMap, BuildToolKind};
use crate::fsutil::{copy_tree, recreate_dir};

pub struct PythonSetup;

impl BuildTool for PythonSetup {
    fn kind(&self) -> BuildToolKind {
        BuildToolKind::Python
    }

    fn configure(&self, job: &BuildJob<'_>) -> Result<()> {
        let source = job.source_dir()?;
        let build = &job.unit.build;
        job.step("configure", || {
            job.step("clone", || {
                recreate_dir(build)?;
                copy_tree(&source, build)
            })
        })
    }

    fn build(&self, job: &BuildJob<'_>) -> Result<()> {
        let defaults = ArgMap::new()
            .with("--parallel", "{cpu_count}")
            .with("--compiler", "unix")
            .with("--executable", "{prefix_dir}/bin/python3");
        job.step("build", || {
            let args = job.args(defaults, &job.config.build_args)?;
            job.cmd("python3", "build")
                .args(["./setup.py", "build"])
                .args(args)
                .error_msg(format!("setup.py build failed for {}", job.unit.unit))
                .run()
        })
    }

    fn install(&self, job: &BuildJob<'_>) -> Result<()> {
        job.step("install", || {
            let args = job.args(
                ArgMap::new().with("--prefix", "{prefix_dir}"),
                &job.config.install_args,
            )?;
            job.cmd("python3", "install")
                .args(["./setup.py", "install"])
                .args(args)
                .error_msg(format!("setup.py install failed for {}", job.unit.unit))
                .run()
        })
    }
}
