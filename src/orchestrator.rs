//! The ordered toolchain list of one build plan.
//!
//! The system toolchain always comes first. Every plan entry becomes a cross
//! toolchain whose parent is the named earlier entry, or the system
//! toolchain when no parent is given. Building walks the list in order, so a
//! parent is complete before any child starts.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Plan;
use crate::error::BuildError;
use crate::handlers::ConfigSub;
use crate::toolchain::{Toolchain, ROOT_LABEL};

pub struct Orchestrator {
    toolchains: Vec<Toolchain>,
}

impl Orchestrator {
    pub fn from_plan(plan: &Plan) -> Result<Self> {
        Self::from_plan_with_env(plan, std::env::vars().collect(), ConfigSub::shared())
    }

    /// Compose every toolchain of `plan` over an explicit host environment.
    pub fn from_plan_with_env(
        plan: &Plan,
        host_env: BTreeMap<String, String>,
        config_sub: Arc<ConfigSub>,
    ) -> Result<Self> {
        let root = Toolchain::system_with_env(&plan.root_dir, &plan.host, host_env, config_sub)
            .context("composing the system toolchain")?;
        let mut toolchains = vec![root];

        for config in &plan.toolchains {
            let parent_name = config.parent.as_deref().unwrap_or("");
            let parent = find(&toolchains, parent_name).ok_or_else(|| {
                BuildError::Configuration(format!(
                    "toolchain '{}' names unknown parent '{parent_name}'",
                    config.name
                ))
            })?;
            let child = Toolchain::child(parent, config)
                .with_context(|| format!("composing toolchain '{}'", config.name))?;
            toolchains.push(child);
        }

        Ok(Self { toolchains })
    }

    pub fn toolchains(&self) -> &[Toolchain] {
        &self.toolchains
    }

    /// Look up a toolchain by name; `root` or an empty name is the system one.
    pub fn toolchain(&self, name: &str) -> Option<&Toolchain> {
        find(&self.toolchains, name)
    }

    pub fn build(&mut self) -> Result<()> {
        for toolchain in &mut self.toolchains {
            info!(toolchain = %toolchain.label(), "building toolchain");
            toolchain.build()?;
        }
        info!("all toolchains built");
        Ok(())
    }

    /// Human-readable build order.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for toolchain in &self.toolchains {
            let core = toolchain.core();
            let _ = write!(out, "{} ({}, {}", core.label(), core.level(), core.triple());
            if let Some(parent) = core.parent() {
                let _ = write!(out, ", parent {}", parent.label());
            }
            let _ = writeln!(out, ") -> {}", core.layout().prefix.display());
            for library in toolchain.libraries() {
                let _ = writeln!(out, "  {:<20} {}", library.label(), library.config().url);
            }
        }
        out
    }

    /// The named toolchain's build state as pretty JSON.
    pub fn state_json(&self, name: &str) -> Result<String> {
        let toolchain = self.toolchain(name).ok_or_else(|| {
            BuildError::Configuration(format!("no toolchain named '{name}' in this plan"))
        })?;
        serde_json::to_string_pretty(toolchain.state()).context("serializing toolchain state")
    }

    pub fn root_dir(&self) -> Option<&Path> {
        self.toolchains
            .first()
            .and_then(|root| root.core().layout().prefix.parent())
    }
}

fn find<'a>(toolchains: &'a [Toolchain], name: &str) -> Option<&'a Toolchain> {
    if name.is_empty() || name == ROOT_LABEL {
        return toolchains.first();
    }
    toolchains.iter().skip(1).find(|tc| tc.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_plan, BootstrapSources, HookSpec, LibraryConfig, ToolchainConfig};
    use crate::phase::Phase;
    use crate::status::StatusFile;
    use crate::testutil::{fake_tool, path_env, tar_gz, HttpFixture, Route};
    use crate::toolchain::JOBS_ENV;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn recording_configure(name: &str) -> String {
        format!("#!/bin/sh\necho \"{name} configure $*\" >> \"$INVOCATIONS\"\n")
    }

    fn archive(dir: &str, name: &str, extra: &[(&str, &str, u32)]) -> Vec<u8> {
        let configure = recording_configure(name);
        let path = format!("{dir}/configure");
        let mut entries = vec![(path.as_str(), configure.as_str(), 0o755)];
        entries.extend_from_slice(extra);
        tar_gz(&entries)
    }

    struct Scenario {
        temp: TempDir,
        server: HttpFixture,
        env: BTreeMap<String, String>,
        plan: Plan,
        invocations: PathBuf,
    }

    impl Scenario {
        fn new() -> Self {
            let prerequisites = "#!/bin/sh\necho \"gcc download_prerequisites\" >> \"$INVOCATIONS\"\n";
            let server = HttpFixture::start(vec![
                Route::file("/binutils-2.28.tar.gz", archive("binutils-2.28", "binutils", &[]))
                    .etag("\"b\""),
                Route::file(
                    "/gcc-7.1.0.tar.gz",
                    archive(
                        "gcc-7.1.0",
                        "gcc",
                        &[("gcc-7.1.0/contrib/download_prerequisites", prerequisites, 0o755)],
                    ),
                )
                .etag("\"g\""),
                Route::file("/musl-1.1.16.tar.gz", archive("musl-1.1.16", "musl", &[]))
                    .etag("\"m\""),
                Route::file("/zlib-1.2.11.tar.gz", archive("zlib-1.2.11", "zlib", &[]))
                    .etag("\"z\""),
            ]);

            let temp = TempDir::new().unwrap();
            let bin = temp.path().join("bin");
            fake_tool(
                &bin,
                "make",
                "echo \"make $(basename \"$PWD\") $*\" >> \"$INVOCATIONS\"",
            );
            let invocations = temp.path().join("invocations");
            let mut env = path_env();
            env.insert("PATH".into(), format!("{}:{}", bin.display(), env["PATH"]));
            env.insert("INVOCATIONS".into(), invocations.display().to_string());
            env.insert(JOBS_ENV.into(), "2".into());

            let mut child = ToolchainConfig::new("x86_64");
            child.bootstrap = BootstrapSources {
                binutils: server.url("/binutils-2.28.tar.gz"),
                gcc: server.url("/gcc-7.1.0.tar.gz"),
                musl: server.url("/musl-1.1.16.tar.gz"),
            };
            child.libraries.push(
                LibraryConfig::new("zlib", server.url("/zlib-1.2.11.tar.gz"))
                    .configure_arg("--host", false)
                    .configure_arg("--build", false)
                    .configure_arg("--static", true),
            );
            let plan = Plan {
                root_dir: temp.path().join("tc"),
                host: ToolchainConfig::default().triple("x86_64-linux-gnu"),
                toolchains: vec![child],
            };

            Self {
                temp,
                server,
                env,
                plan,
                invocations,
            }
        }

        fn build(&self) {
            Orchestrator::from_plan_with_env(
                &self.plan,
                self.env.clone(),
                Arc::new(ConfigSub::from_bytes("")),
            )
            .unwrap()
            .build()
            .unwrap();
        }

        fn invocations(&self) -> Vec<String> {
            fs::read_to_string(&self.invocations)
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[test]
    fn fresh_bootstrap_builds_in_order_then_rerun_is_silent() {
        let scenario = Scenario::new();

        scenario.build();

        let calls = scenario.invocations();
        let configures: Vec<&String> = calls.iter().filter(|c| c.contains(" configure ")).collect();
        let who: Vec<&str> = configures
            .iter()
            .map(|c| c.split(' ').next().unwrap())
            .collect();
        assert_eq!(who, ["binutils", "gcc", "musl", "gcc", "zlib"]);
        assert!(configures[1].contains("--enable-languages=c,c++ "));
        assert!(configures[3].contains("--enable-languages=c,c++,fortran"));

        let prefix = scenario.temp.path().join("tc/x86_64");
        let zlib = configures[4];
        assert!(zlib.contains(&format!("--prefix={}", prefix.display())));
        assert!(zlib.contains("--static"));
        assert!(!zlib.contains("--host"));
        assert!(!zlib.contains("--build"));

        let prerequisites = calls
            .iter()
            .position(|c| c == "gcc download_prerequisites")
            .unwrap();
        let stage1_configure = calls.iter().position(|c| c.starts_with("gcc configure")).unwrap();
        assert!(prerequisites < stage1_configure);

        let mut units: Vec<&str> = calls
            .iter()
            .filter_map(|c| c.strip_prefix("make "))
            .map(|c| c.split(' ').next().unwrap())
            .collect();
        units.dedup();
        assert_eq!(
            units,
            [
                "binutils-2.28",
                "gcc-7.1.0_stage1",
                "musl-1.1.16",
                "gcc-7.1.0_stage2",
                "zlib-1.2.11"
            ]
        );
        assert!(calls.contains(&"make gcc-7.1.0_stage1 -j2 all-gcc".to_string()));
        assert!(calls.contains(&"make gcc-7.1.0_stage1 install-target-libgcc".to_string()));
        assert_eq!(fs::read_link(prefix.join("usr")).unwrap(), Path::new("."));

        fs::remove_file(&scenario.invocations).unwrap();
        scenario.build();

        assert!(scenario.invocations().is_empty());
        for path in [
            "/binutils-2.28.tar.gz",
            "/gcc-7.1.0.tar.gz",
            "/musl-1.1.16.tar.gz",
            "/zlib-1.2.11.tar.gz",
        ] {
            assert_eq!(scenario.server.gets(path), 1, "{path}");
        }
    }

    #[test]
    fn sibling_toolchains_modify_shared_sources_once() {
        let scenario = Scenario::new();
        let mut plan = scenario.plan.clone();
        let zlib = plan.toolchains[0].libraries[0].clone().hook(HookSpec::shell([(
            Phase::PostExtract,
            "echo \"zlib post_extract\" >> \"$INVOCATIONS\"",
        )]));
        plan.toolchains[0].libraries[0] = zlib;
        let mut sibling = plan.toolchains[0].clone();
        sibling.name = "i686".into();
        sibling.triple = Some("i686-linux-musl".into());
        plan.toolchains.push(sibling);

        Orchestrator::from_plan_with_env(
            &plan,
            scenario.env.clone(),
            Arc::new(ConfigSub::from_bytes("")),
        )
        .unwrap()
        .build()
        .unwrap();

        let calls = scenario.invocations();
        let count = |line: &str| calls.iter().filter(|c| *c == line).count();
        assert_eq!(count("gcc download_prerequisites"), 1);
        assert_eq!(count("zlib post_extract"), 1);
        assert_eq!(calls.iter().filter(|c| c.starts_with("zlib configure")).count(), 2);

        let setup = scenario.temp.path().join("tc/setup");
        for label in ["x86_64", "i686"] {
            let status = StatusFile::for_unit(&setup.join(label).join("status"), "zlib-1.2.11");
            assert!(status.is_done("install").unwrap(), "{label}");
        }
        let shared = StatusFile::for_source(&setup.join("src/gcc-7.1.0"));
        assert!(shared.is_done("gcc-7.1.0_stage1/shell_post_extract").unwrap());
        for path in ["/gcc-7.1.0.tar.gz", "/zlib-1.2.11.tar.gz"] {
            assert_eq!(scenario.server.gets(path), 1, "{path}");
        }
    }

    #[test]
    fn failure_names_the_library_and_stops() {
        let scenario = Scenario::new();
        let mut plan = scenario.plan.clone();
        plan.toolchains[0].bootstrap.musl = HttpFixture::dead_url("/musl-1.1.16.tar.gz");

        let err = Orchestrator::from_plan_with_env(
            &plan,
            scenario.env.clone(),
            Arc::new(ConfigSub::from_bytes("")),
        )
        .unwrap()
        .build()
        .unwrap_err();

        let message = format!("{err:#}");
        assert!(message.contains("download failed for library 'musl'"));
        assert!(message.contains("toolchain 'x86_64'"));
        assert!(!scenario
            .invocations()
            .iter()
            .any(|c| c.contains("stage2") || c.starts_with("zlib")));
    }

    #[test]
    fn plans_list_and_nest_toolchains() {
        let plan = parse_plan(
            r#"
            root_dir = "/opt/tc"

            [host]
            triple = "x86_64-linux-gnu"

            [[toolchain]]
            name = "x86_64"

            [[toolchain]]
            name = "arm"
            parent = "x86_64"
            triple = "arm-linux-musleabihf"
            bundles = ["linux_headers"]
            "#,
            Path::new("/"),
        )
        .unwrap();

        let orchestrator = Orchestrator::from_plan_with_env(
            &plan,
            path_env(),
            Arc::new(ConfigSub::from_bytes("")),
        )
        .unwrap();

        let labels: Vec<&str> = orchestrator.toolchains().iter().map(|t| t.label()).collect();
        assert_eq!(labels, ["root", "x86_64", "arm"]);
        assert_eq!(orchestrator.root_dir(), Some(Path::new("/opt/tc")));

        let arm = orchestrator.toolchain("arm").unwrap();
        assert_eq!(arm.libraries().last().unwrap().name(), "linux");
        assert_eq!(arm.env()["CC_FOR_BUILD"], "x86_64-linux-musl-gcc");

        let listing = orchestrator.describe();
        assert!(listing.contains("arm (cross, arm-linux-musleabihf, parent x86_64) -> /opt/tc/arm"));
        assert!(listing.contains("  gcc_stage1"));

        let json: serde_json::Value =
            serde_json::from_str(&orchestrator.state_json("arm").unwrap()).unwrap();
        assert_eq!(json["prefix_dir"], "/opt/tc/arm");
        assert_eq!(json["parent_prefix_dir"], "/opt/tc/x86_64");
        assert_eq!(json["parent_target_triple"], "x86_64-linux-musl");
        assert!(orchestrator.state_json("missing").is_err());
        assert!(orchestrator.toolchain("root").is_some());
    }
}
