//! JSON file store.
//!
//! The whole store lives in one file:
//!
//! ```json
//! { "version": 1, "entries": { "accessToken": "...", "user": "{...}" } }
//! ```
//!
//! Writes go to a sibling temp file which is fsynced and renamed over the
//! original, so a crash leaves either the old or the new contents.
//!
//! Reads and writes fail on a file that does not parse or carries another
//! format version. Removals do not: they replace such a file with an empty
//! store, so logging out always works.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

use super::{KeyValueStore, StoreError};

/// On-disk format version written by this build.
pub const STORE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            version: STORE_FORMAT_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

/// Crash-durable [`KeyValueStore`] backed by a single JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open a store at `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<StoreFile, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoreFile::default()),
            Err(e) => return Err(e.into()),
        };

        let file: StoreFile = serde_json::from_slice(&bytes)?;
        if file.version != STORE_FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: file.version,
                expected: STORE_FORMAT_VERSION,
            });
        }
        Ok(file)
    }

    async fn persist(&self, file: &StoreFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(file)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let mut tmp = tokio::fs::File::create(&tmp_path).await?;
        tmp.write_all(&bytes).await?;
        tmp.sync_all().await?;
        drop(tmp);

        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Apply `change` to the entries and write them back if it reports a change.
    async fn update<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;
        if change(&mut file.entries) {
            self.persist(&file).await?;
        }
        Ok(())
    }

    /// Remove `keys`. An unreadable file holds no usable entries and is
    /// replaced with an empty store.
    async fn remove_keys(&self, keys: &[&str]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut file = match self.load().await {
            Ok(file) => file,
            Err(e @ (StoreError::Corrupt(_) | StoreError::UnsupportedVersion { .. })) => {
                warn!(error = %e, path = %self.path.display(), "Replacing unreadable session store");
                return self.persist(&StoreFile::default()).await;
            }
            Err(e) => return Err(e),
        };

        let changed = keys
            .iter()
            .fold(false, |changed, key| file.entries.remove(*key).is_some() || changed);
        if changed {
            self.persist(&file).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.load().await?.entries.remove(key))
    }

    #[instrument(skip(self, value), fields(path = %self.path.display()))]
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
            true
        })
        .await
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.remove_keys(&[key]).await
    }

    #[instrument(skip_all, fields(path = %self.path.display(), count = entries.len()))]
    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        self.update(|map| {
            for (key, value) in entries {
                map.insert((*key).to_owned(), (*value).to_owned());
            }
            true
        })
        .await
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        self.remove_keys(keys).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileStore::new(&path);
        store
            .set_many(&[("accessToken", "a1"), ("refreshToken", "r1")])
            .await
            .unwrap();
        drop(store);

        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get("accessToken").await.unwrap().as_deref(),
            Some("a1")
        );
        assert_eq!(
            reopened.get("refreshToken").await.unwrap().as_deref(),
            Some("r1")
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get("user").await.unwrap(), None);
        store.remove("user").await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_remove_many() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("session.json"));
        store
            .set_many(&[("accessToken", "a"), ("refreshToken", "r"), ("user", "{}")])
            .await
            .unwrap();

        store
            .remove_many(&["accessToken", "refreshToken", "user"])
            .await
            .unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let file: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(file["version"], 1);
        assert_eq!(file["entries"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"version":99,"entries":{}}"#).unwrap();

        let err = FileStore::new(&path).get("user").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnsupportedVersion {
                found: 99,
                expected: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileStore::new(&path).get("user").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_removal_replaces_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"version":1,"entries":{"accessToken":"t""#).unwrap();

        let store = FileStore::new(&path);
        store
            .remove_many(&["accessToken", "refreshToken", "user"])
            .await
            .unwrap();

        assert_eq!(store.get("accessToken").await.unwrap(), None);
        assert!(!std::fs::read_to_string(&path).unwrap().contains("\"t\""));
    }

    #[tokio::test]
    async fn test_removal_replaces_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"version":99,"entries":{"user":"{}"}}"#).unwrap();

        let store = FileStore::new(&path);
        store.remove("user").await.unwrap();

        assert_eq!(store.get("user").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_to_corrupt_file_still_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileStore::new(&path).set("user", "{}").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json");
    }
}
