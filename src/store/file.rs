#![forbid(unsafe_code)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{Result, TaskflowError};
use crate::store::KeyValueStore;

/// One file per key under a single directory.
///
/// Writes go to `<file>.tmp` first and are renamed into place, so a reader
/// never observes a half-written value.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self, key: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            TaskflowError::storage(key, format!("failed to create {}: {e}", self.dir.display()))
        })
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.kv", encode_key(key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TaskflowError::storage(
                key,
                format!("failed to read {}: {e}", path.display()),
            )),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_dir(key)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("kv.tmp");
        std::fs::write(&tmp, value.as_bytes()).map_err(|e| {
            TaskflowError::storage(key, format!("failed to write {}: {e}", tmp.display()))
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            TaskflowError::storage(
                key,
                format!(
                    "failed to rename {} -> {}: {e}",
                    tmp.display(),
                    path.display()
                ),
            )
        })?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TaskflowError::storage(
                key,
                format!("failed to remove {}: {e}", path.display()),
            )),
        }
    }
}

/// Percent-encodes every byte outside `[A-Za-z0-9_-]`.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
            out.push(char::from(b));
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_keys_into_safe_file_names() {
        assert_eq!(encode_key("@taskflow_device_id"), "%40taskflow_device_id");
        assert_eq!(encode_key("a.b/c"), "a%2Eb%2Fc");
        assert_ne!(encode_key("a.tmp"), encode_key("a"));
        assert_ne!(encode_key("a%2E"), encode_key("a."));
    }

    #[test]
    fn set_get_remove_round_trip_on_disk() {
        let td = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(td.path().join("data"));

        assert_eq!(store.get("@k").unwrap(), None);
        store.set("@k", "value").unwrap();
        assert_eq!(store.get("@k").unwrap().as_deref(), Some("value"));
        assert!(store.path_for("@k").exists());

        store.set("@k", "replaced").unwrap();
        assert_eq!(store.get("@k").unwrap().as_deref(), Some("replaced"));

        store.remove("@k").unwrap();
        store.remove("@k").unwrap();
        assert_eq!(store.get("@k").unwrap(), None);
    }

    #[test]
    fn unwritable_dir_reports_storage_unavailable() {
        let td = tempfile::tempdir().expect("tempdir");
        let blocker = td.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let store = FileStore::new(blocker.join("nested"));

        let err = store.set("k", "v").unwrap_err();
        assert!(matches!(err, TaskflowError::StorageUnavailable { .. }));
    }
}
