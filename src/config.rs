//! Typed build configuration.
//!
//! [`LibraryConfig`] describes one library unit and [`Plan`] a whole build
//! (toolchains and their libraries), loaded from a `plan.toml`:
//!
//! ```toml
//! root_dir = "/opt/toolchains"
//!
//! [host]
//! c_flags = ["-O2"]
//!
//! [[toolchain]]
//! name = "x86_64"
//! triple = "x86_64-linux-musl"
//! c_flags = ["-O2", "-fPIC"]
//! bundles = ["compression_libraries"]
//!
//! [[toolchain.library]]
//! name = "libffi"
//! url = "https://github.com/libffi/libffi/releases/download/v3.2.1/libffi-3.2.1.tar.gz"
//! configure_args = { "--host" = false, "--disable-docs" = true }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;

use crate::error::BuildError;
use crate::phase::Phase;
use crate::state::{render, BuildState};

pub const DEFAULT_BINUTILS_URL: &str =
    "https://ftpmirror.gnu.org/gnu/binutils/binutils-2.28.tar.bz2";
pub const DEFAULT_GCC_URL: &str = "https://ftpmirror.gnu.org/gnu/gcc/gcc-7.1.0/gcc-7.1.0.tar.bz2";
pub const DEFAULT_MUSL_URL: &str = "https://www.musl-libc.org/releases/musl-1.1.16.tar.gz";

// ─────────────────────────────────────────────────────────────────────────────
// Argument maps
// ─────────────────────────────────────────────────────────────────────────────

/// One command-line argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// Never emitted. Used to drop a default the target's build system rejects.
    Omit,
    /// Emitted as the bare key.
    Flag,
    /// Emitted as `key=value`.
    Value(String),
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        if value {
            ArgValue::Flag
        } else {
            ArgValue::Omit
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Value(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Value(value)
    }
}

impl<'de> Deserialize<'de> for ArgValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ArgValueVisitor;

        impl Visitor<'_> for ArgValueVisitor {
            type Value = ArgValue;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a boolean, string or integer argument value")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<ArgValue, E> {
                Ok(v.into())
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ArgValue, E> {
                Ok(v.into())
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ArgValue, E> {
                Ok(ArgValue::Value(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ArgValue, E> {
                Ok(ArgValue::Value(v.to_string()))
            }
        }

        deserializer.deserialize_any(ArgValueVisitor)
    }
}

/// Insertion-ordered argument map.
///
/// Setting an existing key replaces its value in place, so caller overrides
/// keep the position of the default they replace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgMap {
    entries: Vec<(String, ArgValue)>,
}

impl ArgMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ArgValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Apply `overrides` on top of this map.
    pub fn merge(&mut self, overrides: &ArgMap) {
        for (key, value) in &overrides.entries {
            self.set(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Render to command-line words against `state`.
    pub fn render(&self, state: &BuildState) -> Result<Vec<String>> {
        let mut words = Vec::with_capacity(self.entries.len());
        for (key, value) in &self.entries {
            match value {
                ArgValue::Omit => {}
                ArgValue::Flag => words.push(render(key, state)?),
                ArgValue::Value(v) => words.push(render(&format!("{key}={v}"), state)?),
            }
        }
        Ok(words)
    }
}

impl<K, V> FromIterator<(K, V)> for ArgMap
where
    K: Into<String>,
    V: Into<ArgValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = ArgMap::new();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

impl<'de> Deserialize<'de> for ArgMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ArgMapVisitor;

        impl<'de> Visitor<'de> for ArgMapVisitor {
            type Value = ArgMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a table of arguments or a list of bare arguments")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ArgMap, A::Error> {
                let mut map = ArgMap::new();
                while let Some((key, value)) = access.next_entry::<String, ArgValue>()? {
                    map.set(key, value);
                }
                Ok(map)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<ArgMap, A::Error> {
                let mut map = ArgMap::new();
                while let Some(word) = access.next_element::<String>()? {
                    map.set(word, ArgValue::Flag);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_any(ArgMapVisitor)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Library configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Build systems the smart build dispatcher knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildToolKind {
    Autotools,
    Cmake,
    Boost,
    Python,
    Make,
}

impl fmt::Display for BuildToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildToolKind::Autotools => write!(f, "autotools"),
            BuildToolKind::Cmake => write!(f, "cmake"),
            BuildToolKind::Boost => write!(f, "boost"),
            BuildToolKind::Python => write!(f, "python"),
            BuildToolKind::Make => write!(f, "make"),
        }
    }
}

/// Extra phase handlers declared in configuration. They register after the
/// default download/extract/build handlers, so they win any phase they share.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HookSpec {
    /// `sh -c` command templates keyed by phase name.
    Shell { commands: BTreeMap<String, String> },
    /// Patches (URL, local file or inline diff) applied with `patch -p1`.
    Patch {
        #[serde(default = "default_patch_phase")]
        phase: String,
        patches: Vec<String>,
        #[serde(default)]
        patch_root: Option<String>,
    },
    /// Replace a bundled `config.sub` with an up to date copy.
    ConfigSub {
        #[serde(default = "default_config_sub_path")]
        path: String,
    },
}

impl HookSpec {
    pub fn shell<I, P, C>(commands: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: fmt::Display,
        C: Into<String>,
    {
        HookSpec::Shell {
            commands: commands
                .into_iter()
                .map(|(p, c)| (p.to_string(), c.into()))
                .collect(),
        }
    }

    fn validate(&self, library: &str) -> Result<()> {
        let phases: Vec<&str> = match self {
            HookSpec::Shell { commands } => commands.keys().map(String::as_str).collect(),
            HookSpec::Patch { phase, patches, .. } => {
                if patches.is_empty() {
                    return Err(BuildError::Configuration(format!(
                        "library '{library}': patch hook lists no patches"
                    ))
                    .into());
                }
                vec![phase.as_str()]
            }
            HookSpec::ConfigSub { .. } => Vec::new(),
        };
        for phase in phases {
            phase
                .parse::<Phase>()
                .with_context(|| format!("library '{library}'"))?;
        }
        Ok(())
    }
}

fn default_patch_phase() -> String {
    Phase::PostExtract.to_string()
}

fn default_config_sub_path() -> String {
    "config.sub".to_string()
}

fn default_build_targets() -> Vec<String> {
    vec!["all".to_string()]
}

fn default_install_targets() -> Vec<String> {
    vec!["install".to_string()]
}

fn default_src_dir() -> String {
    ".".to_string()
}

fn default_build_type() -> String {
    "MinSizeRel".to_string()
}

/// Configuration for one library build unit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibraryConfig {
    pub name: String,
    pub url: String,
    /// Skip build-system detection.
    #[serde(default)]
    pub build_tool: Option<BuildToolKind>,
    #[serde(default)]
    pub configure_args: ArgMap,
    #[serde(default)]
    pub build_args: ArgMap,
    #[serde(default)]
    pub install_args: ArgMap,
    #[serde(default = "default_build_targets")]
    pub build_targets: Vec<String>,
    #[serde(default = "default_install_targets")]
    pub install_targets: Vec<String>,
    /// Environment overrides; values are templates.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Subdirectory of the source holding the build system.
    #[serde(default = "default_src_dir")]
    pub src_dir: String,
    /// Distinguishes several builds of one source.
    #[serde(default)]
    pub build_postfix: String,
    #[serde(default)]
    pub in_source_build: bool,
    /// Expected archive digest; a cached archive that matches skips the network.
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub bjam_path: Option<String>,
    #[serde(default = "default_build_type")]
    pub build_type: String,
    #[serde(default)]
    pub hooks: Vec<HookSpec>,
}

impl LibraryConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            build_tool: None,
            configure_args: ArgMap::new(),
            build_args: ArgMap::new(),
            install_args: ArgMap::new(),
            build_targets: default_build_targets(),
            install_targets: default_install_targets(),
            env: BTreeMap::new(),
            src_dir: default_src_dir(),
            build_postfix: String::new(),
            in_source_build: false,
            sha256: None,
            bjam_path: None,
            build_type: default_build_type(),
            hooks: Vec::new(),
        }
    }

    pub fn build_tool(mut self, kind: BuildToolKind) -> Self {
        self.build_tool = Some(kind);
        self
    }

    pub fn configure_arg(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.configure_args.set(key, value);
        self
    }

    pub fn build_arg(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.build_args.set(key, value);
        self
    }

    pub fn install_arg(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.install_args.set(key, value);
        self
    }

    pub fn build_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build_targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn install_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.install_targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn build_postfix(mut self, postfix: impl Into<String>) -> Self {
        self.build_postfix = postfix.into();
        self
    }

    pub fn in_source_build(mut self, enabled: bool) -> Self {
        self.in_source_build = enabled;
        self
    }

    pub fn hook(mut self, hook: HookSpec) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BuildError::Configuration("library name must not be empty".into()).into());
        }
        if self.url.trim().is_empty() {
            return Err(BuildError::Configuration(format!(
                "library '{}' has no url",
                self.name
            ))
            .into());
        }
        if let Some(sha) = &self.sha256 {
            if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(BuildError::Configuration(format!(
                    "library '{}': sha256 must be 64 hex characters",
                    self.name
                ))
                .into());
            }
        }
        let src_dir = Path::new(&self.src_dir);
        if src_dir.is_absolute()
            || src_dir
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(BuildError::Configuration(format!(
                "library '{}': src_dir '{}' must stay inside the source tree",
                self.name, self.src_dir
            ))
            .into());
        }
        for hook in &self.hooks {
            hook.validate(&self.name)?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Toolchains and plans
// ─────────────────────────────────────────────────────────────────────────────

/// Bulk library sets a toolchain can pull in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bundle {
    CompressionLibraries,
    LinuxHeaders,
}

/// Source archives for the cross bootstrap chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapSources {
    #[serde(default = "default_binutils_url")]
    pub binutils: String,
    #[serde(default = "default_gcc_url")]
    pub gcc: String,
    #[serde(default = "default_musl_url")]
    pub musl: String,
}

fn default_binutils_url() -> String {
    DEFAULT_BINUTILS_URL.to_string()
}

fn default_gcc_url() -> String {
    DEFAULT_GCC_URL.to_string()
}

fn default_musl_url() -> String {
    DEFAULT_MUSL_URL.to_string()
}

impl Default for BootstrapSources {
    fn default() -> Self {
        Self {
            binutils: default_binutils_url(),
            gcc: default_gcc_url(),
            musl: default_musl_url(),
        }
    }
}

/// One toolchain entry. The host toolchain uses the same shape with an empty
/// name and no parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainConfig {
    #[serde(default)]
    pub name: String,
    /// Name of an earlier toolchain; absent means the host toolchain.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub triple: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub abi: Option<String>,
    #[serde(default)]
    pub c_flags: Vec<String>,
    #[serde(default)]
    pub cxx_flags: Vec<String>,
    #[serde(default)]
    pub fc_flags: Vec<String>,
    /// Also build a shared libc next to the static one.
    #[serde(default)]
    pub shared_libc: bool,
    #[serde(default)]
    pub bootstrap: BootstrapSources,
    #[serde(default)]
    pub bundles: Vec<Bundle>,
    #[serde(default, rename = "library")]
    pub libraries: Vec<LibraryConfig>,
}

impl ToolchainConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn triple(mut self, triple: impl Into<String>) -> Self {
        self.triple = Some(triple.into());
        self
    }

    pub fn c_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.c_flags = flags.into_iter().map(Into::into).collect();
        self
    }
}

/// Names that would collide with the shared `setup/` tree.
const RESERVED_NAMES: &[&str] = &["setup", "archive", "src", "root"];

/// A whole build: host toolchain plus ordered child toolchains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub root_dir: PathBuf,
    pub host: ToolchainConfig,
    pub toolchains: Vec<ToolchainConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanToml {
    root_dir: Option<PathBuf>,
    #[serde(default)]
    host: ToolchainConfig,
    #[serde(default, rename = "toolchain")]
    toolchains: Vec<ToolchainConfig>,
}

/// Default build root: `<data dir>/toolchain-builder`.
pub fn default_root_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|dir| dir.join("toolchain-builder"))
        .ok_or_else(|| {
            BuildError::Configuration(
                "cannot determine a default root_dir; set root_dir in the plan".into(),
            )
            .into()
        })
}

pub fn load_plan(path: &Path) -> Result<Plan> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading build plan '{}'", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_plan(&text, base).with_context(|| format!("parsing build plan '{}'", path.display()))
}

/// Parse plan text; a relative `root_dir` resolves against `base`.
pub fn parse_plan(text: &str, base: &Path) -> Result<Plan> {
    let parsed: PlanToml = toml::from_str(text)
        .map_err(|e| BuildError::Configuration(e.to_string()))?;

    let root_dir = match parsed.root_dir {
        Some(dir) if dir.is_absolute() => dir,
        Some(dir) => base.join(dir),
        None => default_root_dir()?,
    };

    let plan = Plan {
        root_dir,
        host: parsed.host,
        toolchains: parsed.toolchains,
    };
    plan.validate()?;
    Ok(plan)
}

impl Plan {
    fn validate(&self) -> Result<()> {
        if !self.host.name.is_empty() || self.host.parent.is_some() {
            return Err(BuildError::Configuration(
                "[host] takes no name or parent".into(),
            )
            .into());
        }
        for library in &self.host.libraries {
            library.validate()?;
        }

        let mut seen = HashSet::new();
        for toolchain in &self.toolchains {
            let name = toolchain.name.as_str();
            if name.is_empty() {
                return Err(BuildError::Configuration("toolchain name must not be empty".into()).into());
            }
            if RESERVED_NAMES.contains(&name) || name.contains('/') {
                return Err(BuildError::Configuration(format!(
                    "toolchain name '{name}' is reserved or not a plain directory name"
                ))
                .into());
            }
            if let Some(parent) = toolchain.parent.as_deref() {
                if !parent.is_empty() && !seen.contains(parent) {
                    return Err(BuildError::Configuration(format!(
                        "toolchain '{name}' names parent '{parent}', which is not declared before it"
                    ))
                    .into());
                }
            }
            if !seen.insert(name) {
                return Err(BuildError::Configuration(format!(
                    "toolchain '{name}' is declared twice"
                ))
                .into());
            }
            for library in &toolchain.libraries {
                library.validate()?;
            }
        }
        Ok(())
    }
}
