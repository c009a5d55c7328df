//! CMake projects, built out of tree with the Makefile generator.

use anyhow::Result;

use super::{BuildJob, BuildTool};
use crate::config::{ArgMap, BuildToolKind};
use crate::fsutil::recreate_dir;

pub struct CMake;

impl CMake {
    fn default_args(job: &BuildJob<'_>) -> ArgMap {
        let mut args = ArgMap::new()
            .with("-DCMAKE_INSTALL_PREFIX", "{prefix_dir}")
            .with("-DCMAKE_BUILD_TYPE", job.config.build_type.as_str());
        if job.state.contains("cmake_toolchain_file") {
            args.set("-DCMAKE_TOOLCHAIN_FILE", "{cmake_toolchain_file}");
        }
        args
    }
}

impl BuildTool for CMake {
    fn kind(&self) -> BuildToolKind {
        BuildToolKind::Cmake
    }

    fn configure(&self, job: &BuildJob<'_>) -> Result<()> {
        let source = job.source_dir()?;
        job.step("configure", || {
            let args = job.args(Self::default_args(job), &job.config.configure_args)?;
            // A half-configured cache poisons the next attempt.
            recreate_dir(&job.unit.build)?;
            job.cmd("cmake", "configure")
                .args(args)
                .arg(source.display().to_string())
                .error_msg(format!("cmake failed for {}", job.unit.unit))
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
