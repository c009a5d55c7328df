//! Phase handlers and the per-library binding table.
//!
//! A library build walks [`Phase::ALL`] in order. Each phase slot is bound
//! to at most one [`PhaseHandler`]: handlers are registered in a list and the
//! last one declaring a phase wins, which lets user hooks replace the
//! default download/extract/build behaviour for single phases.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Stamp;
//!
//! impl PhaseHandler for Stamp {
//!     fn name(&self) -> &str { "stamp" }
//!     fn phases(&self) -> Vec<Phase> { vec![Phase::PostInstall] }
//!     fn run(&mut self, _phase: Phase, ctx: &PhaseContext<'_>) -> Result<Option<StateUpdate>> {
//!         Ok(Some(update([("stamped", ctx.render("{prefix_dir}")?)])))
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;

use crate::error::BuildError;
use crate::process;
use crate::state::{render, render_env, BuildState, StateUpdate};
use crate::status::StatusFile;

/// One step of the fixed library lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Phase {
    PreDownload = 0,
    Download = 1,
    PostDownload = 2,
    PreExtract = 3,
    Extract = 4,
    PostExtract = 5,
    PreConfigure = 6,
    Configure = 7,
    PostConfigure = 8,
    PreBuild = 9,
    Build = 10,
    PostBuild = 11,
    PreInstall = 12,
    Install = 13,
    PostInstall = 14,
}

impl Phase {
    /// Every phase in execution order.
    pub const ALL: [Phase; 15] = [
        Phase::PreDownload,
        Phase::Download,
        Phase::PostDownload,
        Phase::PreExtract,
        Phase::Extract,
        Phase::PostExtract,
        Phase::PreConfigure,
        Phase::Configure,
        Phase::PostConfigure,
        Phase::PreBuild,
        Phase::Build,
        Phase::PostBuild,
        Phase::PreInstall,
        Phase::Install,
        Phase::PostInstall,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::PreDownload => "pre_download",
            Phase::Download => "download",
            Phase::PostDownload => "post_download",
            Phase::PreExtract => "pre_extract",
            Phase::Extract => "extract",
            Phase::PostExtract => "post_extract",
            Phase::PreConfigure => "pre_configure",
            Phase::Configure => "configure",
            Phase::PostConfigure => "post_configure",
            Phase::PreBuild => "pre_build",
            Phase::Build => "build",
            Phase::PostBuild => "post_build",
            Phase::PreInstall => "pre_install",
            Phase::Install => "install",
            Phase::PostInstall => "post_install",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| BuildError::Configuration(format!("unknown phase '{s}'")))
    }
}

/// Anything that can run one or more library phases.
///
/// Handlers own their skip logic: the pipeline calls every bound handler on
/// every build and the handler consults the unit's status file itself.
pub trait PhaseHandler {
    /// Name for logging.
    fn name(&self) -> &str;

    /// The phases this handler implements.
    fn phases(&self) -> Vec<Phase>;

    /// Run `phase` and optionally return keys to merge into the build state.
    fn run(&mut self, phase: Phase, ctx: &PhaseContext<'_>) -> Result<Option<StateUpdate>>;
}

/// Which handler (by registration index) serves each phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingTable {
    slots: [Option<usize>; 15],
}

impl BindingTable {
    /// Bind every phase to the last handler in `handlers` that declares it.
    pub fn new(handlers: &[Box<dyn PhaseHandler>]) -> Self {
        let mut table = Self::default();
        for (idx, handler) in handlers.iter().enumerate() {
            for phase in handler.phases() {
                table.slots[phase.index()] = Some(idx);
            }
        }
        table
    }

    pub fn bound(&self, phase: Phase) -> Option<usize> {
        self.slots[phase.index()]
    }
}

/// Everything a handler sees while running one phase.
pub struct PhaseContext<'a> {
    pub library: &'a str,
    pub build_postfix: &'a str,
    pub state: &'a BuildState,
    env: &'a BTreeMap<String, String>,
    env_overrides: &'a BTreeMap<String, String>,
}

impl<'a> PhaseContext<'a> {
    pub fn new(
        library: &'a str,
        build_postfix: &'a str,
        state: &'a BuildState,
        env: &'a BTreeMap<String, String>,
        env_overrides: &'a BTreeMap<String, String>,
    ) -> Self {
        Self {
            library,
            build_postfix,
            state,
            env,
            env_overrides,
        }
    }

    pub fn render(&self, template: &str) -> Result<String> {
        render(template, self.state)
    }

    /// The process environment for this library: the toolchain's env with
    /// the library's rendered overrides on top.
    pub fn env(&self) -> Result<BTreeMap<String, String>> {
        let mut env = self.env.clone();
        env.extend(render_env(self.env_overrides, self.state)?);
        Ok(env)
    }

    /// `cpu_count` from state, defaulting to 1.
    pub fn jobs(&self) -> String {
        self.state
            .get("cpu_count")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "1".to_string())
    }

    /// Paths for this library's build unit.
    ///
    /// The unit is named after the extracted source directory (or, before
    /// extraction, the archive, or failing that the library name) plus the
    /// build postfix.
    pub fn unit(&self) -> Result<UnitPaths> {
        let source = match self.state.get("source") {
            Some(_) => Some(self.state.require_path("source")?),
            None => None,
        };
        let base = match (&source, self.state.get("archive")) {
            (Some(source), _) => file_name(source),
            (None, Some(_)) => file_name(&self.state.require_path("archive")?),
            (None, None) => self.library.to_string(),
        };
        let unit = format!("{base}{}", self.build_postfix);

        Ok(UnitPaths {
            logs: self.state.require_path("logs_dir")?.join(&unit),
            build: self.state.require_path("builds_dir")?.join(&unit),
            status: StatusFile::for_unit(&self.state.require_path("status_dir")?, &unit),
            source,
            unit,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Resolved locations for one build unit.
#[derive(Debug, Clone)]
pub struct UnitPaths {
    pub unit: String,
    pub source: Option<PathBuf>,
    pub logs: PathBuf,
    pub build: PathBuf,
    pub status: StatusFile,
}

impl UnitPaths {
    /// Extracted source directory; handlers past `extract` need one.
    pub fn source(&self) -> Result<&Path> {
        self.source.as_deref().ok_or_else(|| {
            BuildError::Configuration(format!(
                "no extracted source available for unit '{}'",
                self.unit
            ))
            .into()
        })
    }

    pub fn log(&self, step: &str) -> PathBuf {
        process::log_path(&self.logs, &self.unit, step)
    }

    /// Completion flags for steps that change the shared source tree.
    pub fn source_steps(&self) -> Result<SourceSteps> {
        Ok(SourceSteps {
            status: StatusFile::for_source(self.source()?),
            unit: self.unit.clone(),
        })
    }
}

/// Steps recorded beside the extracted source instead of in the
/// toolchain's status directory, keyed `<unit>/<step>`.
///
/// Toolchains share one source tree, so a patch applied by the first must
/// not be applied again by the second.
#[derive(Debug, Clone)]
pub struct SourceSteps {
    status: StatusFile,
    unit: String,
}

impl SourceSteps {
    fn key(&self, step: &str) -> String {
        format!("{}/{step}", self.unit)
    }

    pub fn is_done(&self, step: &str) -> Result<bool> {
        self.status.is_done(&self.key(step))
    }

    pub fn mark_done(&self, step: &str) -> Result<()> {
        self.status.mark_done(&self.key(step)).map(|_| ())
    }

    pub fn path(&self) -> &Path {
        self.status.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::update;

    struct Fixed {
        name: &'static str,
        phases: Vec<Phase>,
    }

    impl PhaseHandler for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn phases(&self) -> Vec<Phase> {
            self.phases.clone()
        }

        fn run(&mut self, _phase: Phase, _ctx: &PhaseContext<'_>) -> Result<Option<StateUpdate>> {
            Ok(None)
        }
    }

    #[test]
    fn phases_round_trip_through_names() {
        for phase in Phase::ALL {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
        assert!("postinstall".parse::<Phase>().is_err());
    }

    #[test]
    fn phase_order_is_fixed() {
        let mut sorted = Phase::ALL;
        sorted.sort();
        assert_eq!(sorted, Phase::ALL);
        assert_eq!(Phase::ALL.first(), Some(&Phase::PreDownload));
        assert_eq!(Phase::ALL.last(), Some(&Phase::PostInstall));
    }

    #[test]
    fn last_registered_handler_wins() {
        let handlers: Vec<Box<dyn PhaseHandler>> = vec![
            Box::new(Fixed {
                name: "a",
                phases: vec![Phase::PostExtract, Phase::PreConfigure],
            }),
            Box::new(Fixed {
                name: "b",
                phases: vec![Phase::PostExtract],
            }),
        ];

        let table = BindingTable::new(&handlers);

        assert_eq!(table.bound(Phase::PostExtract), Some(1));
        assert_eq!(table.bound(Phase::PreConfigure), Some(0));
        assert_eq!(table.bound(Phase::Install), None);
    }

    fn dirs_state() -> BuildState {
        let mut state = BuildState::new();
        state.set("logs_dir", "/t/setup/x/log");
        state.set("builds_dir", "/t/setup/x/build");
        state.set("status_dir", "/t/setup/x/status");
        state
    }

    #[test]
    fn unit_is_source_basename_plus_postfix() {
        let mut state = dirs_state();
        state.set("archive", "/t/setup/archive/gcc-7.1.0.tar.bz2");
        state.set("source", "/t/setup/src/gcc-7.1.0");
        let env = BTreeMap::new();
        let ctx = PhaseContext::new("gcc", "_stage1", &state, &env, &env);

        let unit = ctx.unit().unwrap();

        assert_eq!(unit.unit, "gcc-7.1.0_stage1");
        assert_eq!(unit.build, Path::new("/t/setup/x/build/gcc-7.1.0_stage1"));
        assert_eq!(
            unit.log("configure"),
            Path::new("/t/setup/x/log/gcc-7.1.0_stage1/gcc-7.1.0_stage1_configure.log")
        );
        assert_eq!(
            unit.status.path(),
            Path::new("/t/setup/x/status/gcc-7.1.0_stage1.json")
        );
    }

    #[test]
    fn source_steps_live_beside_the_source() {
        let mut state = dirs_state();
        state.set("source", "/t/setup/src/gcc-7.1.0");
        let env = BTreeMap::new();
        let ctx = PhaseContext::new("gcc", "_stage1", &state, &env, &env);

        let steps = ctx.unit().unwrap().source_steps().unwrap();

        assert_eq!(steps.path(), Path::new("/t/setup/src/.gcc-7.1.0.json"));
    }

    #[test]
    fn unit_falls_back_to_library_name() {
        let state = dirs_state();
        let env = BTreeMap::new();
        let ctx = PhaseContext::new("zlib", "", &state, &env, &env);

        let unit = ctx.unit().unwrap();
        assert_eq!(unit.unit, "zlib");
        assert!(unit.source().is_err());
    }

    #[test]
    fn env_overrides_are_rendered_over_base() {
        let mut state = dirs_state();
        state.merge(update([("prefix_dir", "/t/x86_64")]));
        let base = BTreeMap::from([
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("CFLAGS".to_string(), "-O2".to_string()),
        ]);
        let overrides =
            BTreeMap::from([("CFLAGS".to_string(), "-O2 -I{prefix_dir}/include".to_string())]);
        let ctx = PhaseContext::new("zlib", "", &state, &base, &overrides);

        let env = ctx.env().unwrap();
        assert_eq!(env["CFLAGS"], "-O2 -I/t/x86_64/include");
        assert_eq!(env["PATH"], "/usr/bin");
        assert_eq!(ctx.jobs(), "1");
    }
}
