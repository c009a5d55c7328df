//! Subprocess execution.
//!
//! [`Cmd`] spawns external tools with a fully materialized environment and
//! working directory. Output goes to the unit's log file, never to the
//! terminal; the only console trace is a one-line `$ command` echo. Log files
//! are appended to, each attempt starting with its own `$ command` header, so
//! a retried step keeps the output of the run that failed.
//!
//! ```rust,ignore
//! Cmd::new("make")
//!     .args(["-j8", "all"])
//!     .current_dir(&build_dir)
//!     .envs(&env)
//!     .log(&log_path)
//!     .run()?;
//! ```

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};

use crate::error::BuildError;

/// Builder for one external command.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    env: Option<BTreeMap<String, String>>,
    cwd: Option<PathBuf>,
    log: Option<PathBuf>,
    stdin: Option<Vec<u8>>,
    error_msg: Option<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: None,
            cwd: None,
            log: None,
            stdin: None,
            error_msg: None,
        }
    }

    /// `sh -c <script>`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replace the inherited environment with `env`.
    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env = Some(env.clone());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Send stdout and stderr to `path` (truncated first).
    pub fn log(mut self, path: impl Into<PathBuf>) -> Self {
        self.log = Some(path.into());
        self
    }

    pub fn stdin(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    /// Extra context attached to a failure.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Command line as echoed to the console and written to the log.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion with output redirected to the log file.
    pub fn run(&self) -> Result<()> {
        let log_path = self
            .log
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no log file configured for '{}'", self.display()))?;
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::Filesystem {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let display = self.display();
        tracing::info!("$ {}", self.display());

        let mut logfile = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| BuildError::Filesystem {
                path: log_path.clone(),
                reason: e.to_string(),
            })?;
        writeln!(logfile, "$ {display}")?;
        if let Some(cwd) = &self.cwd {
            writeln!(logfile, "# cwd: {}", cwd.display())?;
        }
        writeln!(logfile)?;

        let mut command = self.command()?;
        command
            .stdout(Stdio::from(logfile.try_clone()?))
            .stderr(Stdio::from(logfile));
        if self.stdin.is_some() {
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("spawning '{display}'"))?;
        if let Some(bytes) = &self.stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(bytes)
                    .with_context(|| format!("writing stdin of '{display}'"))?;
            }
        }
        let status = child
            .wait()
            .with_context(|| format!("waiting for '{display}'"))?;

        if !status.success() {
            let err = BuildError::Subprocess {
                command: display,
                status: status.to_string(),
                log: log_path,
            };
            return match &self.error_msg {
                Some(msg) => Err(anyhow::Error::new(err).context(msg.clone())),
                None => Err(err.into()),
            };
        }
        Ok(())
    }

    /// Run and capture stdout. Used for short probes like `cc -dumpmachine`.
    pub fn output(&self) -> Result<String> {
        let display = self.display();
        let output = self
            .command()?
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("running '{display}'"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{}: '{}' exited with {}\n{}",
                self.error_msg.as_deref().unwrap_or("command failed"),
                display,
                output.status,
                stderr.trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn command(&self) -> Result<Command> {
        let mut command = Command::new(self.resolve_program()?);
        command.args(&self.args);
        if let Some(env) = &self.env {
            command.env_clear().envs(env);
        }
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        Ok(command)
    }

    /// Look the program up on the command's own `PATH`, not ours.
    fn resolve_program(&self) -> Result<OsString> {
        if self.program.contains('/') {
            return Ok(OsString::from(&self.program));
        }
        let Some(path) = self.env.as_ref().and_then(|env| env.get("PATH")) else {
            return Ok(OsString::from(&self.program));
        };
        let cwd = match &self.cwd {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("resolving current directory")?,
        };
        match which::which_in(&self.program, Some(path), cwd) {
            Ok(found) => Ok(found.into_os_string()),
            Err(_) => bail!(
                "'{}' not found on PATH '{}'",
                self.program,
                path
            ),
        }
    }
}

fn quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=+./:,@%".contains(c))
    {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Log file path for one step of a unit: `<logs>/<unit>_<step>.log`.
pub fn log_path(logs_dir: &Path, unit: &str, step: &str) -> PathBuf {
    logs_dir.join(format!("{unit}_{step}.log"))
}
