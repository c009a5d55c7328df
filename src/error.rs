//! Error taxonomy for toolchain builds.
//!
//! Every fallible function in this crate returns [`anyhow::Result`]. When a
//! failure belongs to one of the categories below it is raised as a
//! [`BuildError`] so callers can classify it with
//! `err.downcast_ref::<BuildError>()` after any amount of added context.
//!
//! Nothing is retried. A failure aborts the library, its toolchain and the
//! whole run; the log file named in the error keeps the full output.

use std::path::PathBuf;

use thiserror::Error;

/// Classified build failures.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Malformed or contradictory build arguments or plan entries.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No known build-system marker file in an extracted source tree.
    #[error("could not determine build system for '{}' (no configure, autogen.sh, CMakeLists.txt, Jamroot, setup.py or Makefile)", .source_dir.display())]
    UnrecognizedBuildSystem { source_dir: PathBuf },

    /// A spawned command exited unsuccessfully.
    #[error("command failed ({status}): {command}\n  see log: {}", .log.display())]
    Subprocess {
        command: String,
        status: String,
        log: PathBuf,
    },

    /// An HTTP request failed or returned an error status.
    #[error("download of {url} failed: {reason}")]
    Network { url: String, reason: String },

    /// The download dispatcher has no driver for this URL scheme.
    #[error("unsupported download protocol for '{url}' (only http and https are supported)")]
    UnsupportedProtocol { url: String },

    /// A patch did not apply cleanly.
    #[error("failed to apply patch '{patch}' to {unit}\n  see log: {}", .log.display())]
    PatchApply {
        unit: String,
        patch: String,
        log: PathBuf,
    },

    /// A status record could not be parsed.
    #[error("status file '{}' is unreadable: {reason}", .path.display())]
    StatusStore { path: PathBuf, reason: String },

    /// A template referenced a key that is not in the build state.
    #[error("template '{template}' references unknown state key '{key}'")]
    Template { key: String, template: String },

    /// A path the build needs to write is not writable.
    #[error("filesystem error at '{}': {reason}", .path.display())]
    Filesystem { path: PathBuf, reason: String },
}

impl BuildError {
    /// Find the first [`BuildError`] in an error chain.
    pub fn find(err: &anyhow::Error) -> Option<&BuildError> {
        err.chain().find_map(|cause| cause.downcast_ref::<BuildError>())
    }
}
