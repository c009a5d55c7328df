//! Boost.Build: `bootstrap.sh`, then `b2` (or a prebuilt `bjam`).
//!
//! The tree is copied into the build directory first because `bootstrap.sh`
//! writes `project-config.jam` and the engine next to itself. A generated
//! `user-config.jam` pins the toolset to the environment's `CXX`, which is
//! the only way to point b2 at a cross compiler.

use std::fs;

use anyhow::{Context, Result};

use super::{BuildJob, BuildTool};
use crate::config::{ArgMap, BuildToolKind};
use crate::fsutil::{copy_tree, recreate_dir};

pub struct BoostBuild;

const USER_CONFIG: &str = "user-config.jam";

/// Escape braces so `text` survives template rendering unchanged.
fn literal(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

impl BoostBuild {
    fn engine(job: &BuildJob<'_>) -> Result<String> {
        match &job.config.bjam_path {
            Some(path) => job.render(path),
            None => Ok(job.unit.build.join("b2").display().to_string()),
        }
    }

    fn bootstrap_args(job: &BuildJob<'_>) -> ArgMap {
        let mut args = ArgMap::new()
            .with("--prefix", "{prefix_dir}")
            .with("--with-toolset", "gcc");
        if let Some(bjam) = &job.config.bjam_path {
            args.set("--with-bjam", bjam.as_str());
        }
        args
    }

    fn build_args(job: &BuildJob<'_>) -> ArgMap {
        let mut args = ArgMap::new()
            .with("include", "{prefix_dir}/include")
            .with("library-path", "{prefix_dir}/lib")
            .with("-q", true)
            .with("-a", true);
        for (var, key) in [("CFLAGS", "cflags"), ("CXXFLAGS", "cxxflags")] {
            if let Some(flags) = job.env.get(var).filter(|f| !f.is_empty()) {
                args.set(key, literal(flags));
            }
        }
        args.set(
            "--user-config",
            literal(&job.unit.build.join(USER_CONFIG).display().to_string()),
        );
        args.set("toolset", "gcc");
        args
    }
}

impl BuildTool for BoostBuild {
    fn kind(&self) -> BuildToolKind {
        BuildToolKind::Boost
    }

    fn configure(&self, job: &BuildJob<'_>) -> Result<()> {
        let source = job.source_dir()?;
        let build = &job.unit.build;
        job.step("configure", || {
            let args = job.args(Self::bootstrap_args(job), &job.config.configure_args)?;
            job.step("clone", || {
                recreate_dir(build)?;
                copy_tree(&source, build)
            })?;

            let cxx = job.env.get("CXX").map(String::as_str).unwrap_or("g++");
            let user_config = build.join(USER_CONFIG);
            fs::write(&user_config, format!("using gcc : : {cxx} ;\n"))
                .with_context(|| format!("writing '{}'", user_config.display()))?;

            job.cmd(build.join("bootstrap.sh").display().to_string(), "configure")
                .args(args)
                .error_msg(format!("bootstrap.sh failed for {}", job.unit.unit))
                .run()
        })
    }

    fn build(&self, job: &BuildJob<'_>) -> Result<()> {
        if job.config.build_targets.is_empty() {
            return Ok(());
        }
        job.step("make", || {
            let engine = Self::engine(job)?;
            let args = job.args(Self::build_args(job), &job.config.build_args)?;
            job.cmd(engine, "make")
                .arg(format!("-j{}", job.jobs))
                .args(args)
                .error_msg(format!("b2 failed for {}", job.unit.unit))
                .run()
        })
    }

    fn install(&self, job: &BuildJob<'_>) -> Result<()> {
        if job.config.install_targets.is_empty() {
            return Ok(());
        }
        job.step("install", || {
            let engine = Self::engine(job)?;
            let args = job.args(
                ArgMap::new().with("--prefix", "{prefix_dir}"),
                &job.config.install_args,
            )?;
            job.cmd(engine, "install")
                .args(args)
                .arg("install")
                .error_msg(format!("b2 install failed for {}", job.unit.unit))
                .run()
        })
    }
}
