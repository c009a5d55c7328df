//! Resumable builds of cross toolchains and the libraries that go in them.
//!
//! A build is an ordered list of toolchains. The system toolchain wraps the
//! host compiler; every other toolchain is a cross toolchain built by its
//! parent and bootstrapped from source (binutils, gcc, musl). Each toolchain
//! owns an ordered list of libraries, and each library runs a fixed list of
//! phases:
//!
//! - **Phases** - `pre_download` through `post_install`, in a fixed order
//! - **Handlers** - the last handler registered for a phase runs it
//! - **Status files** - every completed step is recorded, so a re-run skips
//!   finished work and resumes at the step that failed
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!     │
//!     ├── Toolchain "root"      (system: host cc, PATH, flags)
//!     │
//!     └── Toolchain "x86_64"    (cross: parent = root)
//!             ├── binutils, gcc_stage1, musl, gcc_stage2
//!             └── user libraries
//!                     │
//!                     └── Library: download → extract → configure → build → install
//!                             ├── SmartDownload  (HTTP, ETag/Last-Modified skip)
//!                             ├── SmartExtract   (tar.{gz,xz,bz2,zst}, zip)
//!                             ├── SmartBuild     (autotools, cmake, make, boost, python)
//!                             └── hooks          (shell, patch, config.sub, callbacks)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::path::Path;
//! use toolchain_builder::config::{LibraryConfig, ToolchainConfig};
//! use toolchain_builder::Toolchain;
//!
//! let root = Toolchain::system(Path::new("/opt/tc"), &ToolchainConfig::default())?;
//! let mut musl = Toolchain::child(&root, &ToolchainConfig::new("x86_64"))?;
//! musl.add_library(
//!     LibraryConfig::new("zlib", "https://zlib.net/fossils/zlib-1.2.11.tar.gz")
//!         .configure_arg("--host", false)
//!         .configure_arg("--static", true),
//! )?;
//! musl.build()?;
//! ```

pub mod config;
pub mod download;
pub mod drivers;
pub mod error;
pub mod extract;
pub mod fsutil;
pub mod handlers;
pub mod library;
pub mod orchestrator;
pub mod phase;
pub mod process;
pub mod recipes;
pub mod state;
pub mod status;
pub mod toolchain;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{load_plan, ArgMap, ArgValue, LibraryConfig, Plan, ToolchainConfig};
pub use error::BuildError;
pub use library::Library;
pub use orchestrator::Orchestrator;
pub use phase::{Phase, PhaseContext, PhaseHandler};
pub use state::{render, BuildState};
pub use toolchain::{Toolchain, ToolchainLevel};
