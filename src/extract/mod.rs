//! Archive extraction.
//!
//! Every format unpacks into `sources_dir/<archive base name>/` with the
//! archive's shared leading directory stripped, so `zlib-1.2.11.tar.gz`
//! holding `zlib-1.2.11/configure` yields `src/zlib-1.2.11/configure`
//! whatever the archive's internal folder is called.
//!
//! Archives unpack into a `<base>.partial` sibling that is renamed into place
//! only once every member is written, so the source directory exists only
//! when extraction finished. Re-extracting also drops the record kept beside
//! the old tree, since patches and hooks applied to it are gone.

pub mod tar;
pub mod zip;

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::error::BuildError;
use crate::fsutil::{is_newer, recreate_dir, remove_path, touch};
use crate::phase::{Phase, PhaseContext, PhaseHandler};
use crate::state::{update, StateUpdate};
use crate::status::StatusFile;

/// Tar compression variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Xz,
    Bzip2,
    Zstd,
}

/// How an archive is unpacked, decided by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Tar(Compression),
    Zip,
    /// A single file that is not an archive at all.
    Plain,
}

const SUFFIXES: &[(&str, ArchiveKind)] = &[
    (".tar.gz", ArchiveKind::Tar(Compression::Gzip)),
    (".tar.xz", ArchiveKind::Tar(Compression::Xz)),
    (".tar.bz2", ArchiveKind::Tar(Compression::Bzip2)),
    (".tar.zst", ArchiveKind::Tar(Compression::Zstd)),
    (".tar", ArchiveKind::Tar(Compression::None)),
    (".tgz", ArchiveKind::Tar(Compression::Gzip)),
    (".txz", ArchiveKind::Tar(Compression::Xz)),
    (".tbz2", ArchiveKind::Tar(Compression::Bzip2)),
    (".tbz", ArchiveKind::Tar(Compression::Bzip2)),
    (".zip", ArchiveKind::Zip),
];

/// Archive kind and base name (file name without the archive suffix).
pub fn classify(file_name: &str) -> (ArchiveKind, String) {
    for (suffix, kind) in SUFFIXES {
        if let Some(stem) = file_name.strip_suffix(suffix) {
            if !stem.is_empty() {
                return (*kind, stem.to_string());
            }
        }
    }
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    (ArchiveKind::Plain, stem)
}

/// Leading directory shared by every member.
///
/// `members` pairs each member path with whether it is a directory. A file
/// contributes its parent, so an archive of one file keeps that file.
pub fn common_prefix<'a, I>(members: I) -> PathBuf
where
    I: IntoIterator<Item = (&'a Path, bool)>,
{
    let mut prefix: Option<Vec<Component<'a>>> = None;
    for (path, is_dir) in members {
        let mut components: Vec<Component<'a>> = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        if !is_dir {
            components.pop();
        }
        prefix = Some(match prefix {
            None => components,
            Some(current) => current
                .into_iter()
                .zip(components)
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a)
                .collect(),
        });
    }
    prefix.unwrap_or_default().into_iter().collect()
}

/// `path` relative to `prefix`, rejecting anything that could escape the
/// destination. `None` means the member is the prefix itself.
pub(crate) fn strip_member(path: &Path, prefix: &Path) -> Result<Option<PathBuf>> {
    let normalized: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    let rel = normalized.strip_prefix(prefix).unwrap_or(&normalized);
    if rel
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return Err(BuildError::Configuration(format!(
            "archive member '{}' escapes the extraction directory",
            path.display()
        ))
        .into());
    }
    if rel.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(rel.to_path_buf()))
    }
}

/// Unpack `archive` under `sources_dir` and return the source directory.
///
/// Skipped when the destination is newer than the archive.
pub fn unpack(archive: &Path, sources_dir: &Path) -> Result<PathBuf> {
    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            BuildError::Configuration(format!("archive path '{}' has no file name", archive.display()))
        })?;
    let (kind, base) = classify(&file_name);
    let dest = sources_dir.join(&base);

    if is_newer(&dest, archive) {
        info!("{file_name} already extracted, skipping");
        return Ok(dest);
    }

    info!("extracting {file_name} to {}", dest.display());
    let staging = sources_dir.join(format!("{base}.partial"));
    recreate_dir(&staging)?;
    match kind {
        ArchiveKind::Tar(compression) => tar::unpack(archive, compression, &staging),
        ArchiveKind::Zip => zip::unpack(archive, &staging),
        ArchiveKind::Plain => fs::copy(archive, staging.join(&file_name))
            .map(|_| ())
            .with_context(|| format!("copying '{}'", archive.display())),
    }
    .with_context(|| format!("extracting '{}'", archive.display()))?;

    remove_path(&dest)?;
    remove_path(StatusFile::for_source(&dest).path())?;
    fs::rename(&staging, &dest).map_err(|e| BuildError::Filesystem {
        path: dest.clone(),
        reason: e.to_string(),
    })?;
    touch(&dest)?;

    Ok(dest)
}

/// Default `extract` handler. Returns `{source}`.
pub struct SmartExtract;

impl PhaseHandler for SmartExtract {
    fn name(&self) -> &str {
        "extract"
    }

    fn phases(&self) -> Vec<Phase> {
        vec![Phase::Extract]
    }

    fn run(&mut self, _phase: Phase, ctx: &PhaseContext<'_>) -> Result<Option<StateUpdate>> {
        if !ctx.state.contains("archive") {
            return Err(BuildError::Configuration(format!(
                "library '{}' has no archive to extract",
                ctx.library
            ))
            .into());
        }
        let archive = ctx.state.require_path("archive")?;
        let source = unpack(&archive, &ctx.state.require_path("sources_dir")?)?;
        Ok(Some(update([("source", source)])))
    }
}
