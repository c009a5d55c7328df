//! Filesystem helpers shared by the handlers and drivers.
//!
//! Everything here tolerates a tree that a previous run already populated:
//! re-running a build must never fail because a directory or symlink exists.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::error::BuildError;

/// Create `dir` and its parents if missing.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| {
        BuildError::Filesystem {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Create `link -> target` unless an identical link is already there.
pub fn ensure_symlink(target: &Path, link: &Path) -> Result<()> {
    if link.is_symlink() {
        let current = fs::read_link(link)
            .with_context(|| format!("reading symlink '{}'", link.display()))?;
        if current == target {
            return Ok(());
        }
        fs::remove_file(link)
            .with_context(|| format!("replacing stale symlink '{}'", link.display()))?;
    } else if link.exists() {
        // A real directory or file already occupies the name; leave it be.
        return Ok(());
    }
    std::os::unix::fs::symlink(target, link)
        .with_context(|| format!("creating symlink '{}' -> '{}'", link.display(), target.display()))
}

/// Remove everything inside `dir`, then make sure it exists.
pub fn recreate_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .with_context(|| format!("wiping directory '{}'", dir.display()))?;
    }
    ensure_dir(dir)
}

/// Remove a file or directory tree; a missing path is fine.
pub fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() && !path.is_symlink() {
        fs::remove_dir_all(path)
            .with_context(|| format!("removing directory '{}'", path.display()))
    } else if path.exists() || path.is_symlink() {
        fs::remove_file(path).with_context(|| format!("removing '{}'", path.display()))
    } else {
        Ok(())
    }
}

/// Recursively copy the contents of `src` into `dst`, preserving symlinks.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.with_context(|| format!("walking '{}'", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("relativizing '{}'", entry.path().display()))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            if target.exists() || target.is_symlink() {
                fs::remove_file(&target)?;
            }
            std::os::unix::fs::symlink(&link, &target)
                .with_context(|| format!("creating symlink '{}'", target.display()))?;
        } else if file_type.is_dir() {
            ensure_dir(&target)?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "copying '{}' -> '{}'",
                    entry.path().display(),
                    target.display()
                )
            })?;
        }
    }

    Ok(())
}

/// Modification time of `path`, if it exists.
pub fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Set the modification time of `path` to now.
pub fn touch(path: &Path) -> Result<()> {
    filetime::set_file_mtime(path, filetime::FileTime::now())
        .with_context(|| format!("touching '{}'", path.display()))
}

/// Whether `output` exists and is strictly newer than `input`.
pub fn is_newer(output: &Path, input: &Path) -> bool {
    match (mtime(output), mtime(input)) {
        (Some(out), Some(inp)) => out > inp,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::TempDir;

    #[test]
    fn ensure_symlink_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let link = temp.path().join("usr");

        ensure_symlink(Path::new("."), &link).unwrap();
        ensure_symlink(Path::new("."), &link).unwrap();

        assert_eq!(fs::read_link(&link).unwrap(), Path::new("."));
    }

    #[test]
    fn copy_tree_copies_nested_files_and_links() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("include/sub")).unwrap();
        fs::write(src.join("Makefile"), "all:\n").unwrap();
        fs::write(src.join("include/sub/a.h"), "#pragma once\n").unwrap();
        std::os::unix::fs::symlink("Makefile", src.join("GNUmakefile")).unwrap();

        let dst = temp.path().join("build");
        copy_tree(&src, &dst).unwrap();
        copy_tree(&src, &dst).unwrap();

        assert!(dst.join("include/sub/a.h").is_file());
        assert_eq!(fs::read_link(dst.join("GNUmakefile")).unwrap(), Path::new("Makefile"));
    }

    #[test]
    fn recreate_dir_wipes_contents() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("build");
        fs::create_dir_all(dir.join("CMakeFiles")).unwrap();
        fs::write(dir.join("CMakeCache.txt"), "stale").unwrap();

        recreate_dir(&dir).unwrap();

        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn is_newer_compares_mtimes() {
        let temp = TempDir::new().unwrap();
        let old = temp.path().join("archive.tar.gz");
        let new = temp.path().join("src");
        fs::write(&old, "a").unwrap();
        fs::create_dir_all(&new).unwrap();
        filetime::set_file_mtime(&old, FileTime::from_unix_time(1_000, 0)).unwrap();
        filetime::set_file_mtime(&new, FileTime::from_unix_time(2_000, 0)).unwrap();

        assert!(is_newer(&new, &old));
        assert!(!is_newer(&old, &new));
        assert!(!is_newer(&temp.path().join("missing"), &old));
    }
}
