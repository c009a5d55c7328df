use std::path::Path;

use anyhow::{bail, Context, Result};
use toolchain_builder::{load_plan, Orchestrator};
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    "Usage:\n  toolchain-builder build <plan.toml>\n  toolchain-builder plan <plan.toml>\n  toolchain-builder state <plan.toml> <toolchain|root>\n\nEnvironment:\n  RUST_LOG                 log filter (default: info)\n  TOOLCHAIN_BUILDER_JOBS   parallel make jobs"
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [cmd, plan] if cmd == "build" => build(Path::new(plan)),
        [cmd, plan] if cmd == "plan" => show_plan(Path::new(plan)),
        [cmd, plan, toolchain] if cmd == "state" => show_state(Path::new(plan), toolchain),
        [help] if help == "-h" || help == "--help" || help == "help" => {
            println!("{}", usage());
            Ok(())
        }
        _ => bail!(usage()),
    }
}

fn orchestrator(plan: &Path) -> Result<Orchestrator> {
    let plan = load_plan(plan)?;
    Orchestrator::from_plan(&plan)
}

fn build(plan: &Path) -> Result<()> {
    let mut orchestrator = orchestrator(plan)?;
    orchestrator
        .build()
        .with_context(|| format!("building plan '{}'", plan.display()))
}

fn show_plan(plan: &Path) -> Result<()> {
    print!("{}", orchestrator(plan)?.describe());
    Ok(())
}

fn show_state(plan: &Path, toolchain: &str) -> Result<()> {
    println!("{}", orchestrator(plan)?.state_json(toolchain)?);
    Ok(())
}
