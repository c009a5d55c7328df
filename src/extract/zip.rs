use std::fs::{self, File};
use std::io::{self, BufReader};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use ::zip::ZipArchive;
use anyhow::{Context, Result};

use super::{common_prefix, strip_member};
use crate::error::BuildError;
use crate::fsutil::ensure_dir;

pub fn unpack(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).with_context(|| format!("opening '{}'", archive.display()))?;
    let mut zip = ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("reading zip directory of '{}'", archive.display()))?;

    let mut members: Vec<(PathBuf, bool)> = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let entry = zip.by_index(i)?;
        let path = entry.enclosed_name().ok_or_else(|| {
            BuildError::Configuration(format!(
                "zip member '{}' escapes the extraction directory",
                entry.name()
            ))
        })?;
        members.push((path, entry.is_dir()));
    }
    let prefix = common_prefix(members.iter().map(|(p, d)| (p.as_path(), *d)));

    for (i, (path, is_dir)) in members.iter().enumerate() {
        let Some(rel) = strip_member(path, &prefix)? else {
            continue;
        };
        let target = dest.join(rel);
        if *is_dir {
            ensure_dir(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }

        let mut entry = zip.by_index(i)?;
        let mut out =
            File::create(&target).with_context(|| format!("creating '{}'", target.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("unpacking '{}'", path.display()))?;
        if let Some(mode) = entry.unix_mode() {
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::zip::write::SimpleFileOptions;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn unpacks_with_prefix_stripped_and_modes_kept() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("eigen.zip");
        {
            let mut writer = ::zip::ZipWriter::new(File::create(&archive).unwrap());
            writer
                .add_directory("eigen-3.3.4/", SimpleFileOptions::default())
                .unwrap();
            writer
                .start_file(
                    "eigen-3.3.4/CMakeLists.txt",
                    SimpleFileOptions::default().unix_permissions(0o644),
                )
                .unwrap();
            writer.write_all(b"project(Eigen3)\n").unwrap();
            writer
                .start_file(
                    "eigen-3.3.4/scripts/check.sh",
                    SimpleFileOptions::default().unix_permissions(0o755),
                )
                .unwrap();
            writer.write_all(b"#!/bin/sh\n").unwrap();
            writer.finish().unwrap();
        }
        let dest = temp.path().join("out");
        fs::create_dir_all(&dest).unwrap();

        unpack(&archive, &dest).unwrap();

        assert_eq!(
            fs::read_to_string(dest.join("CMakeLists.txt")).unwrap(),
            "project(Eigen3)\n"
        );
        let mode = fs::metadata(dest.join("scripts/check.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
