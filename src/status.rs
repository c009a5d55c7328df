//! Per-unit completion records.
//!
//! Every build unit (a library source plus its build postfix, or a download
//! URL) owns one JSON object on disk mapping step names to a `true`/`false`
//! completion flag, plus the odd bookkeeping string such as a stored `etag`.
//!
//! A step is skipped if and only if its flag is `true`. Flags are merged in
//! right after the step succeeds, so an interrupted build leaves the step
//! marked incomplete and it runs again on the next invocation.
//!
//! There is no locking: one build process owns a tree at a time.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::error::BuildError;

/// Parsed status document. Keys are kept sorted so files diff cleanly.
pub type StatusRecord = BTreeMap<String, Value>;

/// Load a status record, creating an empty one on disk if it is missing.
pub fn load(path: &Path) -> Result<StatusRecord> {
    if !path.is_file() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::Filesystem {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        write_atomic(path, b"{}")?;
        return Ok(StatusRecord::new());
    }

    let bytes =
        fs::read(path).with_context(|| format!("reading status file '{}'", path.display()))?;
    let record: StatusRecord =
        serde_json::from_slice(&bytes).map_err(|e| BuildError::StatusStore {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(record)
}

/// Shallow-merge `updates` into the record at `path` and write it back.
pub fn merge<I, K>(path: &Path, updates: I) -> Result<StatusRecord>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    let mut record = load(path)?;
    for (key, value) in updates {
        record.insert(key.into(), value);
    }

    let mut text = serde_json::to_string_pretty(&record)
        .with_context(|| format!("serializing status file '{}'", path.display()))?;
    text.push('\n');
    write_atomic(path, text.as_bytes())?;
    Ok(record)
}

/// Write `<path>.tmp` and rename it over `path`, so a reader sees either the
/// old record or the new one.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).map_err(|e| BuildError::Filesystem {
        path: tmp.clone(),
        reason: e.to_string(),
    })?;
    fs::rename(&tmp, path).map_err(|e| BuildError::Filesystem {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(())
}

/// Whether `step` is recorded as completed.
pub fn is_done(record: &StatusRecord, step: &str) -> bool {
    matches!(record.get(step), Some(Value::Bool(true)))
}

/// Handle to one unit's status file.
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Status file for `unit` inside `status_dir`.
    pub fn for_unit(status_dir: &Path, unit: &str) -> Self {
        Self::new(status_dir.join(format!("{unit}.json")))
    }

    /// Record kept beside a shared source tree as `<sources_dir>/.<base>.json`.
    ///
    /// Steps that modify the source itself are recorded here, so every
    /// toolchain sharing the tree sees them. Re-extraction deletes it.
    pub fn for_source(source: &Path) -> Self {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = source.parent().unwrap_or(Path::new(""));
        Self::new(dir.join(format!(".{name}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<StatusRecord> {
        load(&self.path)
    }

    /// Re-reads the file on every call so sibling handlers see each other's flags.
    pub fn is_done(&self, step: &str) -> Result<bool> {
        Ok(is_done(&self.load()?, step))
    }

    pub fn mark_done(&self, step: &str) -> Result<StatusRecord> {
        merge(&self.path, [(step, Value::Bool(true))])
    }

    pub fn merge<I, K>(&self, updates: I) -> Result<StatusRecord>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        merge(&self.path, updates)
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.load()?.remove(key))
    }

    pub fn get_str(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .load()?
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    pub fn set_str(&self, key: &str, value: &str) -> Result<StatusRecord> {
        merge(&self.path, [(key, Value::String(value.to_string()))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn load_creates_empty_record() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("status/zlib-1.2.11.json");

        let record = load(&path).unwrap();

        assert!(record.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn merge_keeps_existing_keys_and_sorts() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("unit.json");

        merge(&path, [("make_all", json!(true))]).unwrap();
        let record = merge(&path, [("configure", json!(true)), ("install", json!(false))]).unwrap();

        assert_eq!(record.len(), 3);
        let text = fs::read_to_string(&path).unwrap();
        let configure = text.find("\"configure\"").unwrap();
        let install = text.find("\"install\"").unwrap();
        let make_all = text.find("\"make_all\"").unwrap();
        assert!(configure < install && install < make_all);
        assert!(text.contains("\n  \"configure\": true"));
    }

    #[test]
    fn later_keys_win() {
        let temp = TempDir::new().unwrap();
        let status = StatusFile::for_unit(temp.path(), "gcc-7.1.0_stage1");

        status.set_str("etag", "\"abc\"").unwrap();
        status.set_str("etag", "\"def\"").unwrap();

        assert_eq!(status.get_str("etag").unwrap().as_deref(), Some("\"def\""));
    }

    #[test]
    fn only_true_counts_as_done() {
        let temp = TempDir::new().unwrap();
        let status = StatusFile::for_unit(temp.path(), "musl");
        merge(status.path(), [("configure", json!(false)), ("etag", json!("x"))]).unwrap();

        assert!(!status.is_done("configure").unwrap());
        assert!(!status.is_done("etag").unwrap());
        assert!(!status.is_done("install").unwrap());

        status.mark_done("configure").unwrap();
        assert!(status.is_done("configure").unwrap());
    }

    #[test]
    fn failed_write_leaves_previous_record() {
        let temp = TempDir::new().unwrap();
        let status = StatusFile::for_unit(temp.path(), "zlib-1.2.11");
        status.mark_done("configure").unwrap();
        // A directory squatting on the temp name makes the write fail.
        fs::create_dir(temp.path().join("zlib-1.2.11.json.tmp")).unwrap();

        assert!(status.mark_done("make_all").is_err());

        assert!(status.is_done("configure").unwrap());
        assert!(!status.is_done("make_all").unwrap());
    }

    #[test]
    fn rewrite_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let status = StatusFile::for_unit(temp.path(), "musl-1.1.16");

        status.mark_done("configure").unwrap();
        status.mark_done("make_all").unwrap();

        let names: Vec<String> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["musl-1.1.16.json"]);
    }

    #[test]
    fn source_record_sits_beside_the_tree() {
        let status = StatusFile::for_source(Path::new("/t/setup/src/gcc-7.1.0"));
        assert_eq!(status.path(), Path::new("/t/setup/src/.gcc-7.1.0.json"));
    }

    #[test]
    fn corrupt_record_is_a_status_store_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(
            BuildError::find(&err),
            Some(BuildError::StatusStore { .. })
        ));
    }
}
