//! Build-tool drivers and the smart build dispatcher.
//!
//! Every driver implements [`BuildTool`]: `configure`, `build` and `install`
//! for one unit. Each step consults the unit's status file under its own key
//! (`configure`, `make_<target>` for build targets, the bare target name for
//! install targets) and is marked done right after its command succeeds, so
//! a failed `make install` re-runs only the install on the next invocation.

pub mod autotools;
pub mod boost;
pub mod cmake;
pub mod make;
pub mod python;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

use crate::config::{ArgMap, BuildToolKind, LibraryConfig};
use crate::error::BuildError;
use crate::fsutil::ensure_dir;
use crate::phase::{Phase, PhaseContext, PhaseHandler, UnitPaths};
use crate::process::Cmd;
use crate::state::{update, BuildState, StateUpdate};

pub use autotools::Autotools;
pub use boost::BoostBuild;
pub use cmake::CMake;
pub use make::Make;
pub use python::PythonSetup;

/// One build system's configure/build/install steps.
pub trait BuildTool {
    fn kind(&self) -> BuildToolKind;
    fn configure(&self, job: &BuildJob<'_>) -> Result<()>;
    fn build(&self, job: &BuildJob<'_>) -> Result<()>;
    fn install(&self, job: &BuildJob<'_>) -> Result<()>;
}

/// Everything a driver step needs, resolved once per phase.
pub struct BuildJob<'a> {
    pub state: &'a BuildState,
    pub config: &'a LibraryConfig,
    pub unit: UnitPaths,
    pub env: BTreeMap<String, String>,
    pub jobs: String,
}

impl<'a> BuildJob<'a> {
    pub fn new(ctx: &PhaseContext<'a>, config: &'a LibraryConfig) -> Result<Self> {
        Ok(Self {
            state: ctx.state,
            config,
            unit: ctx.unit()?,
            env: ctx.env()?,
            jobs: ctx.jobs(),
        })
    }

    /// Directory holding the build system: the source plus `src_dir`.
    pub fn source_dir(&self) -> Result<PathBuf> {
        Ok(self.unit.source()?.join(&self.config.src_dir))
    }

    pub fn render(&self, template: &str) -> Result<String> {
        self.state.render(template)
    }

    /// Defaults with the library's overrides applied, rendered.
    pub fn args(&self, defaults: ArgMap, overrides: &ArgMap) -> Result<Vec<String>> {
        merged(defaults, overrides).render(self.state)
    }

    /// A command in the build directory with the library environment,
    /// logging to `<unit>_<log>.log`.
    pub fn cmd(&self, program: impl Into<String>, log: &str) -> Cmd {
        Cmd::new(program)
            .envs(&self.env)
            .current_dir(&self.unit.build)
            .log(self.unit.log(log))
    }

    /// Run `f` unless `key` is already recorded, then record it.
    pub fn step(&self, key: &str, f: impl FnOnce() -> Result<()>) -> Result<()> {
        if self.unit.status.is_done(key)? {
            info!(unit = %self.unit.unit, step = key, "already complete, skipping");
            return Ok(());
        }
        f()?;
        self.unit.status.mark_done(key)?;
        Ok(())
    }

    /// `make -jN <args> <target>` for each build target. `args` is
    /// rendered only for targets that still have to run.
    pub fn make_build(&self, targets: &[String], args: &ArgMap) -> Result<()> {
        ensure_dir(&self.unit.build)?;
        for target in targets {
            let step = format!("make_{target}");
            self.step(&step, || {
                self.cmd("make", &step)
                    .arg(format!("-j{}", self.jobs))
                    .args(args.render(self.state)?)
                    .arg(target.as_str())
                    .error_msg(format!("make {target} failed for {}", self.unit.unit))
                    .run()
            })?;
        }
        Ok(())
    }

    /// `make <args> <target>` for each install target.
    pub fn make_install(&self, targets: &[String], args: &ArgMap) -> Result<()> {
        ensure_dir(&self.unit.build)?;
        for target in targets {
            self.step(target, || {
                self.cmd("make", &format!("make_{target}"))
                    .args(args.render(self.state)?)
                    .arg(target.as_str())
                    .error_msg(format!("make {target} failed for {}", self.unit.unit))
                    .run()
            })?;
        }
        Ok(())
    }
}

/// `defaults` with `overrides` applied on top.
pub fn merged(defaults: ArgMap, overrides: &ArgMap) -> ArgMap {
    let mut args = defaults;
    args.merge(overrides);
    args
}

/// Pick a build system by the files present in `dir`.
pub fn detect(dir: &Path) -> Result<BuildToolKind> {
    let has = |name: &str| dir.join(name).is_file();
    let kind = if has("configure") || has("autogen.sh") {
        BuildToolKind::Autotools
    } else if has("CMakeLists.txt") {
        BuildToolKind::Cmake
    } else if has("Jamroot") {
        BuildToolKind::Boost
    } else if has("setup.py") {
        BuildToolKind::Python
    } else if has("Makefile") {
        BuildToolKind::Make
    } else {
        return Err(BuildError::UnrecognizedBuildSystem {
            source_dir: dir.to_path_buf(),
        }
        .into());
    };
    Ok(kind)
}

pub fn driver(kind: BuildToolKind) -> Box<dyn BuildTool> {
    match kind {
        BuildToolKind::Autotools => Box::new(Autotools),
        BuildToolKind::Cmake => Box::new(CMake),
        BuildToolKind::Boost => Box::new(BoostBuild),
        BuildToolKind::Python => Box::new(PythonSetup),
        BuildToolKind::Make => Box::new(Make),
    }
}

/// Default `configure`/`build`/`install` handler.
///
/// The driver is chosen on first use, from `build_tool` when the library
/// names one and by inspecting the extracted source otherwise.
pub struct SmartBuild {
    config: LibraryConfig,
    tool: Option<Box<dyn BuildTool>>,
}

impl SmartBuild {
    pub fn new(config: LibraryConfig) -> Self {
        Self { config, tool: None }
    }

    fn tool(&mut self, job: &BuildJob<'_>) -> Result<&dyn BuildTool> {
        let tool = match self.tool.take() {
            Some(tool) => tool,
            None => {
                let kind = match self.config.build_tool {
                    Some(kind) => kind,
                    None => detect(&job.source_dir()?)?,
                };
                let tool = driver(kind);
                info!(unit = %job.unit.unit, "building with {}", tool.kind());
                tool
            }
        };
        Ok(&**self.tool.insert(tool))
    }
}

impl PhaseHandler for SmartBuild {
    fn name(&self) -> &str {
        "build"
    }

    fn phases(&self) -> Vec<Phase> {
        vec![Phase::Configure, Phase::Build, Phase::Install]
    }

    fn run(&mut self, phase: Phase, ctx: &PhaseContext<'_>) -> Result<Option<StateUpdate>> {
        let config = self.config.clone();
        let job = BuildJob::new(ctx, &config)?;
        let tool = self.tool(&job)?;
        match phase {
            Phase::Configure => tool.configure(&job)?,
            Phase::Build => tool.build(&job)?,
            Phase::Install => tool.install(&job)?,
            _ => return Ok(None),
        }
        Ok(Some(update([
            ("build", job.unit.build.as_path()),
            ("logs", job.unit.logs.as_path()),
        ])))
    }
}
