//! Download dispatch.

pub mod http;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::BuildError;
use crate::phase::{Phase, PhaseContext, PhaseHandler};
use crate::state::{update, StateUpdate};
use crate::status::StatusFile;

pub use http::HttpDownloader;

/// Status file tracking one download URL, kept in the shared archive
/// directory so every toolchain sees the recorded `ETag`.
pub fn status_for_url(archive_dir: &Path, url: &str) -> StatusFile {
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    StatusFile::for_unit(archive_dir, &format!(".download-{}", &digest[..16]))
}

/// Fetch `url` into `archive_dir` and return the archive path.
///
/// With `sha256` set, a previously recorded archive whose digest matches is
/// returned without touching the network.
pub fn fetch(url: &str, archive_dir: &Path, sha256: Option<&str>) -> Result<PathBuf> {
    let status = status_for_url(archive_dir, url);

    if let (Some(expected), Some(recorded)) = (sha256, status.get_str("archive")?) {
        let recorded = PathBuf::from(recorded);
        if recorded.is_file() && sha256_file(&recorded)?.eq_ignore_ascii_case(expected) {
            info!("{} matches its sha256, skipping download", recorded.display());
            return Ok(recorded);
        }
    }

    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(BuildError::UnsupportedProtocol {
            url: url.to_string(),
        }
        .into());
    }
    HttpDownloader::new(url)?.download(archive_dir, &status)
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("reading '{}'", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Default `download` handler. Returns `{archive}`.
pub struct SmartDownload {
    url: String,
    sha256: Option<String>,
}

impl SmartDownload {
    pub fn new(url: impl Into<String>, sha256: Option<String>) -> Self {
        Self {
            url: url.into(),
            sha256,
        }
    }
}

impl PhaseHandler for SmartDownload {
    fn name(&self) -> &str {
        "download"
    }

    fn phases(&self) -> Vec<Phase> {
        vec![Phase::Download]
    }

    fn run(&mut self, _phase: Phase, ctx: &PhaseContext<'_>) -> Result<Option<StateUpdate>> {
        let url = ctx.render(&self.url)?;
        let archive = fetch(
            &url,
            &ctx.state.require_path("archives_dir")?,
            self.sha256.as_deref(),
        )?;
        Ok(Some(update([("archive", archive)])))
    }
}
