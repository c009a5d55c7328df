//! Plain Makefile projects with no configure step.

use anyhow::Result;

use super::{merged, BuildJob, BuildTool};
use crate::config::{ArgMap, BuildToolKind};
use crate::fsutil::copy_tree;

pub struct Make;

impl BuildTool for Make {
    fn kind(&self) -> BuildToolKind {
        BuildToolKind::Make
    }

    /// Copies the source into the build directory; Makefile-only projects
    /// build in place.
    fn configure(&self, job: &BuildJob<'_>) -> Result<()> {
        let source = job.source_dir()?;
        job.step("configure", || copy_tree(&source, &job.unit.build))
    }

    fn build(&self, job: &BuildJob<'_>) -> Result<()> {
        job.make_build(&job.config.build_targets, &job.config.build_args)
    }

    fn install(&self, job: &BuildJob<'_>) -> Result<()> {
        let args = merged(
            ArgMap::new().with("PREFIX", "{prefix_dir}"),
            &job.config.install_args,
        );
        job.make_install(&job.config.install_targets, &args)
    }
}
