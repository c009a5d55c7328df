use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use ::tar::{Archive, EntryType};
use anyhow::{Context, Result};

use super::{common_prefix, strip_member, Compression};
use crate::fsutil::ensure_dir;

fn open(archive: &Path, compression: Compression) -> Result<Archive<Box<dyn Read>>> {
    let file = BufReader::new(
        File::open(archive).with_context(|| format!("opening '{}'", archive.display()))?,
    );
    let reader: Box<dyn Read> = match compression {
        Compression::None => Box::new(file),
        Compression::Gzip => Box::new(flate2::read::MultiGzDecoder::new(file)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new(file)),
        Compression::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(file)),
        Compression::Zstd => Box::new(zstd::stream::Decoder::new(file)?),
    };
    Ok(Archive::new(reader))
}

// pax headers describe other members and are not files themselves
fn is_metadata(kind: EntryType) -> bool {
    matches!(
        kind,
        EntryType::XGlobalHeader | EntryType::XHeader | EntryType::GNULongName | EntryType::GNULongLink
    )
}

pub fn unpack(archive: &Path, compression: Compression, dest: &Path) -> Result<()> {
    let mut members: Vec<(PathBuf, bool)> = Vec::new();
    for entry in open(archive, compression)?.entries()? {
        let entry = entry?;
        let kind = entry.header().entry_type();
        if is_metadata(kind) {
            continue;
        }
        members.push((entry.path()?.into_owned(), kind.is_dir()));
    }
    let prefix = common_prefix(members.iter().map(|(p, d)| (p.as_path(), *d)));

    let mut tar = open(archive, compression)?;
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);

    for entry in tar.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        if is_metadata(kind) {
            continue;
        }
        let path = entry.path()?.into_owned();
        let Some(rel) = strip_member(&path, &prefix)? else {
            continue;
        };
        let target = dest.join(&rel);
        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }

        if kind.is_hard_link() {
            let Some(link) = entry.link_name()?.map(|l| l.into_owned()) else {
                continue;
            };
            let Some(link_rel) = strip_member(&link, &prefix)? else {
                continue;
            };
            let original = dest.join(link_rel);
            if fs::hard_link(&original, &target).is_err() {
                fs::copy(&original, &target).with_context(|| {
                    format!("linking '{}' to '{}'", target.display(), original.display())
                })?;
            }
            continue;
        }

        entry
            .unpack(&target)
            .with_context(|| format!("unpacking '{}'", path.display()))?;
    }

    Ok(())
}
