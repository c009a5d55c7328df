//! Toolchains: directory layout, build state, environment and library list.
//!
//! The system toolchain builds with whatever the host provides. A cross
//! toolchain is always created from a parent; at construction it registers
//! its bootstrap chain (binutils, a stage 1 gcc, musl and a stage 2 gcc)
//! ahead of any user library. Compilers and binutils run on the build
//! machine, so they are built with the parent's environment while still
//! installing into the child's prefix.
//!
//! ```text
//! <root>/<name or root>/                  prefix_dir (with usr -> .)
//! <root>/setup/archive/                   shared downloads, .download-<hash>.json
//! <root>/setup/src/                       shared extracted sources, .<base>.json
//! <root>/setup/<name or root>/build/      one build directory per unit
//! <root>/setup/<name or root>/log/        <unit>/<unit>_<step>.log
//! <root>/setup/<name or root>/status/     <unit>.json
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::{BootstrapSources, HookSpec, LibraryConfig, ToolchainConfig};
use crate::error::BuildError;
use crate::fsutil::{ensure_dir, ensure_symlink};
use crate::handlers::ConfigSub;
use crate::library::Library;
use crate::phase::Phase;
use crate::process::Cmd;
use crate::state::{BuildState, PARENT_PREFIX};

/// Overrides `cpu_count`.
pub const JOBS_ENV: &str = "TOOLCHAIN_BUILDER_JOBS";

/// Directory label of the system toolchain.
pub const ROOT_LABEL: &str = "root";

/// Whether a toolchain targets the host or cross-compiles from a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainLevel {
    System,
    Cross,
}

impl fmt::Display for ToolchainLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolchainLevel::System => write!(f, "system"),
            ToolchainLevel::Cross => write!(f, "cross"),
        }
    }
}

/// Paths of one toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub prefix: PathBuf,
    pub archives: PathBuf,
    pub sources: PathBuf,
    pub setup: PathBuf,
    pub builds: PathBuf,
    pub logs: PathBuf,
    pub status: PathBuf,
}

impl Layout {
    pub fn new(root: &Path, label: &str) -> Self {
        let shared = root.join("setup");
        let setup = shared.join(label);
        Self {
            prefix: root.join(label),
            archives: shared.join("archive"),
            sources: shared.join("src"),
            builds: setup.join("build"),
            logs: setup.join("log"),
            status: setup.join("status"),
            setup,
        }
    }

    pub fn cmake_toolchain_file(&self) -> PathBuf {
        self.setup.join("toolchain.cmake")
    }

    fn dirs(&self) -> [&Path; 7] {
        [
            &self.prefix,
            &self.archives,
            &self.sources,
            &self.setup,
            &self.builds,
            &self.logs,
            &self.status,
        ]
    }
}

/// The immutable part of a toolchain, shared with its children.
#[derive(Debug)]
pub struct ToolchainCore {
    name: String,
    level: ToolchainLevel,
    triple: String,
    arch: String,
    layout: Layout,
    state: BuildState,
    env: Arc<BTreeMap<String, String>>,
    parent: Option<Arc<ToolchainCore>>,
}

impl ToolchainCore {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory label: the name, or `root` for the system toolchain.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            ROOT_LABEL
        } else {
            &self.name
        }
    }

    pub fn level(&self) -> ToolchainLevel {
        self.level
    }

    pub fn triple(&self) -> &str {
        &self.triple
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn state(&self) -> &BuildState {
        &self.state
    }

    pub fn env(&self) -> &Arc<BTreeMap<String, String>> {
        &self.env
    }

    pub fn parent(&self) -> Option<&ToolchainCore> {
        self.parent.as_deref()
    }
}

/// A toolchain and the libraries registered with it, in build order.
pub struct Toolchain {
    core: Arc<ToolchainCore>,
    libraries: Vec<Library>,
    config_sub: Arc<ConfigSub>,
}

impl Toolchain {
    /// The system toolchain, inheriting this process's environment.
    pub fn system(root: &Path, config: &ToolchainConfig) -> Result<Self> {
        Self::system_with_env(root, config, std::env::vars().collect(), ConfigSub::shared())
    }

    /// The system toolchain over an explicit host environment.
    pub fn system_with_env(
        root: &Path,
        config: &ToolchainConfig,
        host_env: BTreeMap<String, String>,
        config_sub: Arc<ConfigSub>,
    ) -> Result<Self> {
        let triple = match &config.triple {
            Some(triple) => triple.clone(),
            None => Cmd::new("cc")
                .arg("-dumpmachine")
                .envs(&host_env)
                .error_msg("cannot determine the host triple")
                .output()?,
        };
        let layout = Layout::new(root, ROOT_LABEL);
        let tools = ToolNames::host(&host_env);

        let mut state = own_state("", &triple, config, &layout, &tools, cpu_count(&host_env));
        let own = state.clone();
        state.nest(PARENT_PREFIX, &own);

        let mut env = host_env;
        prepend(&mut env, "PATH", &layout.prefix.join("bin"));
        prepend(&mut env, "PKG_CONFIG_PATH", &layout.prefix.join("lib/pkgconfig"));
        set_flags(&mut env, config);

        let core = ToolchainCore {
            name: String::new(),
            level: ToolchainLevel::System,
            arch: arch_of(config, &triple),
            triple,
            layout,
            state,
            env: Arc::new(env),
            parent: None,
        };
        let mut toolchain = Self {
            core: Arc::new(core),
            libraries: Vec::new(),
            config_sub,
        };
        toolchain.add_configured(config)?;
        Ok(toolchain)
    }

    /// A cross toolchain built by `parent`. Registers the bootstrap chain.
    pub fn child(parent: &Toolchain, config: &ToolchainConfig) -> Result<Self> {
        if config.name.is_empty() {
            return Err(BuildError::Configuration("cross toolchains need a name".into()).into());
        }
        let parent_core = Arc::clone(&parent.core);
        let triple = match &config.triple {
            Some(triple) => triple.clone(),
            None => parent_core.triple.replace("gnu", "musl"),
        };
        let layout = Layout::new(
            parent_core
                .layout
                .prefix
                .parent()
                .unwrap_or_else(|| Path::new("/")),
            &config.name,
        );
        let tools = ToolNames::cross(&triple);

        let mut state = own_state(
            &config.name,
            &triple,
            config,
            &layout,
            &tools,
            parent_core
                .state
                .get("cpu_count")
                .map(|v| v.to_string())
                .unwrap_or_else(|| cpu_count(&parent_core.env)),
        );
        state.set("cmake_toolchain_file", layout.cmake_toolchain_file());
        state.nest(PARENT_PREFIX, &parent_core.state);

        let mut env = (*parent_core.env).clone();
        let parent_tools = ToolNames::from_state(&parent_core.state);
        for ((var, tool), (_, build_tool)) in tools.vars().into_iter().zip(parent_tools.vars()) {
            env.insert(var.to_string(), tool);
            env.insert(format!("{var}_FOR_BUILD"), build_tool);
        }
        for var in ["CFLAGS", "CXXFLAGS", "FFLAGS", "FCFLAGS"] {
            match parent_core.env.get(var) {
                Some(flags) => env.insert(format!("{var}_FOR_BUILD"), flags.clone()),
                None => env.remove(&format!("{var}_FOR_BUILD")),
            };
            env.remove(var);
        }
        set_flags(&mut env, config);
        prepend(&mut env, "PATH", &layout.prefix.join("bin"));
        prepend(&mut env, "PKG_CONFIG_PATH", &layout.prefix.join("lib/pkgconfig"));

        let core = ToolchainCore {
            name: config.name.clone(),
            level: ToolchainLevel::Cross,
            arch: arch_of(config, &triple),
            triple,
            layout,
            state,
            env: Arc::new(env),
            parent: Some(parent_core),
        };
        let mut toolchain = Self {
            core: Arc::new(core),
            libraries: Vec::new(),
            config_sub: Arc::clone(&parent.config_sub),
        };
        toolchain.add_bootstrap(&config.bootstrap, config.shared_libc)?;
        toolchain.add_configured(config)?;
        Ok(toolchain)
    }

    fn add_configured(&mut self, config: &ToolchainConfig) -> Result<()> {
        for bundle in &config.bundles {
            crate::recipes::apply(self, *bundle)?;
        }
        for library in &config.libraries {
            self.add_library(library.clone())?;
        }
        Ok(())
    }

    fn add_bootstrap(&mut self, sources: &BootstrapSources, shared_libc: bool) -> Result<()> {
        let cross_tool = |config: LibraryConfig| {
            config
                .configure_arg("--host", false)
                .configure_arg("--build", false)
                .configure_arg("--target", "{target_triple}")
                .configure_arg("--with-sysroot", "{prefix_dir}")
                .configure_arg("--disable-nls", true)
                .configure_arg("--disable-multilib", true)
        };

        self.add_tool(
            cross_tool(LibraryConfig::new("binutils", sources.binutils.as_str()))
                .configure_arg("--disable-werror", true),
        )?;

        self.add_tool(
            cross_tool(LibraryConfig::new("gcc", sources.gcc.as_str()))
                .build_postfix("_stage1")
                .configure_arg("--enable-languages", "c,c++")
                .configure_arg("--disable-shared", true)
                .configure_arg("--disable-libsanitizer", true)
                .build_targets(["all-gcc", "all-target-libgcc"])
                .install_targets(["install-gcc", "install-target-libgcc"])
                .hook(HookSpec::shell([(
                    Phase::PostExtract,
                    "./contrib/download_prerequisites",
                )])),
        )?;

        let musl = |postfix: &str, shared: bool| {
            LibraryConfig::new("musl", sources.musl.as_str())
                .build_postfix(postfix)
                .configure_arg("--host", false)
                .configure_arg("--build", false)
                .configure_arg("--target", "{target_triple}")
                .configure_arg(if shared { "--enable-shared" } else { "--disable-shared" }, true)
        };
        self.add_library(musl("", false))?;
        if shared_libc {
            self.add_library(musl("_shared", true))?;
        }

        self.add_tool(
            cross_tool(LibraryConfig::new("gcc", sources.gcc.as_str()))
                .build_postfix("_stage2")
                .configure_arg("--enable-languages", "c,c++,fortran")
                .configure_arg("--enable-libgomp", true)
                .configure_arg("--disable-libsanitizer", true),
        )
    }

    /// A library that builds with this toolchain's environment, not yet
    /// registered. Add handlers to it and pass it to [`Toolchain::add`].
    pub fn library(&self, config: LibraryConfig) -> Result<Library> {
        Library::new(config, Arc::clone(&self.core.env), &self.config_sub)
    }

    pub fn add_library(&mut self, config: LibraryConfig) -> Result<()> {
        let library = self.library(config)?;
        self.add(library);
        Ok(())
    }

    /// Register a build-machine tool, built with the parent's environment.
    pub fn add_tool(&mut self, config: LibraryConfig) -> Result<()> {
        let env = match &self.core.parent {
            Some(parent) => Arc::clone(&parent.env),
            None => Arc::clone(&self.core.env),
        };
        let library = Library::new(config, env, &self.config_sub)?;
        self.add(library);
        Ok(())
    }

    pub fn add(&mut self, library: Library) {
        self.libraries.push(library);
    }

    pub fn core(&self) -> &Arc<ToolchainCore> {
        &self.core
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn label(&self) -> &str {
        self.core.label()
    }

    pub fn state(&self) -> &BuildState {
        &self.core.state
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.core.env
    }

    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    /// Create the directory tree, the `usr -> .` link and, for cross
    /// toolchains, the CMake toolchain file. Safe to repeat.
    pub fn prepare(&self) -> Result<()> {
        let layout = &self.core.layout;
        for dir in layout.dirs() {
            ensure_dir(dir)?;
        }
        ensure_symlink(Path::new("."), &layout.prefix.join("usr"))?;

        if self.core.level == ToolchainLevel::Cross {
            let path = layout.cmake_toolchain_file();
            fs::write(&path, self.cmake_toolchain())
                .with_context(|| format!("writing '{}'", path.display()))?;
        }
        Ok(())
    }

    fn cmake_toolchain(&self) -> String {
        let core = &self.core;
        let prefix = core.layout.prefix.display();
        let triple = &core.triple;
        format!(
            "set(CMAKE_SYSTEM_NAME Linux)\n\
             set(CMAKE_SYSTEM_PROCESSOR {arch})\n\
             set(CMAKE_SYSROOT {prefix})\n\
             set(CMAKE_C_COMPILER {triple}-gcc)\n\
             set(CMAKE_CXX_COMPILER {triple}-g++)\n\
             set(CMAKE_Fortran_COMPILER {triple}-gfortran)\n\
             set(CMAKE_FIND_ROOT_PATH {prefix})\n\
             set(CMAKE_FIND_ROOT_PATH_MODE_PROGRAM NEVER)\n\
             set(CMAKE_FIND_ROOT_PATH_MODE_LIBRARY ONLY)\n\
             set(CMAKE_FIND_ROOT_PATH_MODE_INCLUDE ONLY)\n\
             set(CMAKE_FIND_ROOT_PATH_MODE_PACKAGE ONLY)\n",
            arch = core.arch,
        )
    }

    /// Build every library in registration order.
    pub fn build(&mut self) -> Result<()> {
        self.prepare()?;
        info!(
            toolchain = %self.core.label(),
            triple = %self.core.triple,
            "building {} libraries",
            self.libraries.len()
        );
        let label = self.core.label().to_string();
        for library in &mut self.libraries {
            library
                .build(&self.core.state)
                .with_context(|| format!("toolchain '{label}'"))?;
        }
        Ok(())
    }
}

/// Compiler and binutils names a toolchain exposes.
struct ToolNames {
    cc: String,
    cxx: String,
    fc: String,
    ar: String,
    ranlib: String,
    nm: String,
}

impl ToolNames {
    fn host(env: &BTreeMap<String, String>) -> Self {
        let pick = |var: &str, default: &str| env.get(var).cloned().unwrap_or_else(|| default.into());
        Self {
            cc: pick("CC", "gcc"),
            cxx: pick("CXX", "g++"),
            fc: pick("FC", "gfortran"),
            ar: pick("AR", "ar"),
            ranlib: pick("RANLIB", "ranlib"),
            nm: pick("NM", "nm"),
        }
    }

    fn cross(triple: &str) -> Self {
        Self {
            cc: format!("{triple}-gcc"),
            cxx: format!("{triple}-g++"),
            fc: format!("{triple}-gfortran"),
            ar: format!("{triple}-ar"),
            ranlib: format!("{triple}-ranlib"),
            nm: format!("{triple}-nm"),
        }
    }

    fn from_state(state: &BuildState) -> Self {
        let pick = |key: &str| state.get(key).map(|v| v.to_string()).unwrap_or_default();
        Self {
            cc: pick("cc"),
            cxx: pick("cxx"),
            fc: pick("fc"),
            ar: pick("ar"),
            ranlib: pick("ranlib"),
            nm: pick("nm"),
        }
    }

    fn vars(&self) -> [(&'static str, String); 6] {
        [
            ("CC", self.cc.clone()),
            ("CXX", self.cxx.clone()),
            ("FC", self.fc.clone()),
            ("AR", self.ar.clone()),
            ("RANLIB", self.ranlib.clone()),
            ("NM", self.nm.clone()),
        ]
    }
}

fn own_state(
    name: &str,
    triple: &str,
    config: &ToolchainConfig,
    layout: &Layout,
    tools: &ToolNames,
    cpu_count: String,
) -> BuildState {
    let mut state = BuildState::new();
    state.set("prefix_dir", layout.prefix.as_path());
    state.set("sources_dir", layout.sources.as_path());
    state.set("builds_dir", layout.builds.as_path());
    state.set("logs_dir", layout.logs.as_path());
    state.set("status_dir", layout.status.as_path());
    state.set("archives_dir", layout.archives.as_path());
    state.set("toolchain_name", name);
    state.set("target_triple", triple);
    state.set("arch", arch_of(config, triple));
    state.set("abi", abi_of(config, triple));
    state.set("cpu_count", cpu_count);
    state.set("c_flags", config.c_flags.clone());
    state.set("cxx_flags", config.cxx_flags.clone());
    state.set("fc_flags", config.fc_flags.clone());
    for (key, value) in [
        ("cc", &tools.cc),
        ("cxx", &tools.cxx),
        ("fc", &tools.fc),
        ("ar", &tools.ar),
        ("ranlib", &tools.ranlib),
        ("nm", &tools.nm),
    ] {
        state.set(key, value.as_str());
    }
    state
}

fn arch_of(config: &ToolchainConfig, triple: &str) -> String {
    config
        .arch
        .clone()
        .unwrap_or_else(|| triple.split('-').next().unwrap_or(triple).to_string())
}

fn abi_of(config: &ToolchainConfig, triple: &str) -> String {
    config
        .abi
        .clone()
        .unwrap_or_else(|| triple.rsplit('-').next().unwrap_or_default().to_string())
}

fn cpu_count(env: &BTreeMap<String, String>) -> String {
    env.get(JOBS_ENV)
        .filter(|v| v.parse::<usize>().is_ok_and(|n| n > 0))
        .cloned()
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .to_string()
        })
}

fn prepend(env: &mut BTreeMap<String, String>, var: &str, dir: &Path) {
    let value = match env.get(var).filter(|v| !v.is_empty()) {
        Some(rest) => format!("{}:{rest}", dir.display()),
        None => dir.display().to_string(),
    };
    env.insert(var.to_string(), value);
}

fn set_flags(env: &mut BTreeMap<String, String>, config: &ToolchainConfig) {
    for (vars, flags) in [
        (&["CFLAGS"][..], &config.c_flags),
        (&["CXXFLAGS"][..], &config.cxx_flags),
        (&["FFLAGS", "FCFLAGS"][..], &config.fc_flags),
    ] {
        if flags.is_empty() {
            continue;
        }
        for var in vars {
            env.insert(var.to_string(), flags.join(" "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fake_tool, path_env};
    use tempfile::TempDir;

    fn host(root: &Path) -> Toolchain {
        Toolchain::system_with_env(
            root,
            &ToolchainConfig::default().triple("x86_64-linux-gnu").c_flags(["-O2"]),
            path_env(),
            Arc::new(ConfigSub::from_bytes("")),
        )
        .unwrap()
    }

    #[test]
    fn root_state_nests_itself() {
        let temp = TempDir::new().unwrap();
        let root = host(temp.path());
        let state = root.state();

        assert_eq!(root.label(), "root");
        assert_eq!(root.core().level(), ToolchainLevel::System);
        assert_eq!(state.require_path("prefix_dir").unwrap(), temp.path().join("root"));
        assert_eq!(
            state.require_path("builds_dir").unwrap(),
            temp.path().join("setup/root/build")
        );
        assert_eq!(
            state.require_path("archives_dir").unwrap(),
            temp.path().join("setup/archive")
        );
        assert_eq!(state.require_str("arch").unwrap(), "x86_64");
        assert_eq!(state.require_str("abi").unwrap(), "gnu");
        assert_eq!(
            state.require_str("parent_prefix_dir").unwrap(),
            state.require_str("prefix_dir").unwrap()
        );
        assert_eq!(state.require_str("parent_target_triple").unwrap(), "x86_64-linux-gnu");

        let env = root.env();
        assert!(env["PATH"].starts_with(&format!("{}/bin:", temp.path().join("root").display())));
        assert_eq!(env["CFLAGS"], "-O2");
        assert!(root.libraries().is_empty());
    }

    #[test]
    fn host_triple_comes_from_cc() {
        let temp = TempDir::new().unwrap();
        let bin = temp.path().join("bin");
        fake_tool(&bin, "cc", "echo x86_64-pc-linux-gnu");
        let mut env = path_env();
        env.insert("PATH".into(), format!("{}:{}", bin.display(), env["PATH"]));

        let root = Toolchain::system_with_env(
            &temp.path().join("tc"),
            &ToolchainConfig::default(),
            env,
            Arc::new(ConfigSub::from_bytes("")),
        )
        .unwrap();
        let child = Toolchain::child(&root, &ToolchainConfig::new("nuc")).unwrap();

        assert_eq!(root.core().triple(), "x86_64-pc-linux-gnu");
        assert_eq!(child.core().triple(), "x86_64-pc-linux-musl");
        assert_eq!(child.state().require_str("abi").unwrap(), "musl");
    }

    #[test]
    fn child_env_layers_over_parent() {
        let temp = TempDir::new().unwrap();
        let root = host(temp.path());
        let child = Toolchain::child(
            &root,
            &ToolchainConfig::new("x86_64").c_flags(["-Os", "-fPIC"]),
        )
        .unwrap();
        let env = child.env();

        assert_eq!(env["CC"], "x86_64-linux-musl-gcc");
        assert_eq!(env["NM"], "x86_64-linux-musl-nm");
        assert_eq!(env["CC_FOR_BUILD"], "gcc");
        assert_eq!(env["CFLAGS"], "-Os -fPIC");
        assert_eq!(env["CFLAGS_FOR_BUILD"], "-O2");
        let child_bin = temp.path().join("x86_64/bin").display().to_string();
        let root_bin = temp.path().join("root/bin").display().to_string();
        assert!(env["PATH"].starts_with(&format!("{child_bin}:{root_bin}:")));
        assert!(env["PKG_CONFIG_PATH"].starts_with(&temp.path().join("x86_64/lib/pkgconfig").display().to_string()));

        let state = child.state();
        assert_eq!(
            state.require_path("parent_prefix_dir").unwrap(),
            temp.path().join("root")
        );
        assert_eq!(state.require_str("parent_target_triple").unwrap(), "x86_64-linux-gnu");
        assert_eq!(
            state.require_path("cmake_toolchain_file").unwrap(),
            temp.path().join("setup/x86_64/toolchain.cmake")
        );
        assert_eq!(child.core().parent().map(|p| p.label()), Some("root"));
    }

    #[test]
    fn bootstrap_precedes_user_libraries() {
        let temp = TempDir::new().unwrap();
        let root = host(temp.path());
        let mut config = ToolchainConfig::new("x86_64");
        config.shared_libc = true;
        config
            .libraries
            .push(LibraryConfig::new("zlib", "https://zlib.net/zlib-1.2.11.tar.gz"));

        let child = Toolchain::child(&root, &config).unwrap();

        let labels: Vec<String> = child.libraries().iter().map(Library::label).collect();
        assert_eq!(
            labels,
            ["binutils", "gcc_stage1", "musl", "musl_shared", "gcc_stage2", "zlib"]
        );
        let stage1 = &child.libraries()[1];
        assert_eq!(stage1.bound_handler(Phase::PostExtract), Some("shell"));
    }

    #[test]
    fn prepare_is_repeatable() {
        let temp = TempDir::new().unwrap();
        let root = host(temp.path());
        let child = Toolchain::child(&root, &ToolchainConfig::new("x86_64")).unwrap();

        child.prepare().unwrap();
        child.prepare().unwrap();

        let prefix = temp.path().join("x86_64");
        assert_eq!(fs::read_link(prefix.join("usr")).unwrap(), Path::new("."));
        let cmake = fs::read_to_string(temp.path().join("setup/x86_64/toolchain.cmake")).unwrap();
        assert!(cmake.contains("set(CMAKE_C_COMPILER x86_64-linux-musl-gcc)"));
        assert!(cmake.contains(&format!("set(CMAKE_SYSROOT {})", prefix.display())));
        assert!(temp.path().join("setup/x86_64/status").is_dir());
    }

    #[test]
    fn jobs_override_from_env() {
        let mut env = BTreeMap::new();
        env.insert(JOBS_ENV.to_string(), "3".to_string());
        assert_eq!(cpu_count(&env), "3");
        env.insert(JOBS_ENV.to_string(), "zero".to_string());
        assert_ne!(cpu_count(&env), "zero");
    }
}
