//! Durable State Storage
//!
//! File-backed key/value stores for state that must survive restarts:
//! a global store shared by every project, one store per project, and a
//! secret store for keystore passwords.
//!
//! Every operation goes straight to disk. Reads parse the file each time and
//! writes replace it atomically, so two handles on the same file always agree.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{CoreError, Result};

const GLOBAL_STATE_FILE: &str = "global-state.json";
const SECRETS_FILE: &str = "secrets.json";
const WORKSPACES_DIR: &str = "workspaces";

/// A JSON object on disk addressed by string keys
pub struct StateStore {
    path: PathBuf,
    /// Create files readable by the owner only (Unix)
    private: bool,
    write_lock: Mutex<()>,
}

impl StateStore {
    /// Open a store backed by `path`. The file is created on first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            private: false,
            write_lock: Mutex::new(()),
        }
    }

    fn open_private(path: impl Into<PathBuf>) -> Self {
        Self {
            private: true,
            ..Self::open(path)
        }
    }

    /// Store shared by every project (saved wireless devices live here)
    pub fn global(data_dir: &Path) -> Self {
        Self::open(data_dir.join(GLOBAL_STATE_FILE))
    }

    /// Store scoped to one project root
    pub fn for_workspace(data_dir: &Path, project_root: &Path) -> Self {
        Self::open(
            data_dir
                .join(WORKSPACES_DIR)
                .join(format!("{}.json", workspace_key(project_root))),
        )
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a value. A missing file or key is `Ok(None)`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let map = self.read_map().await?;
        match map.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Set (`Some`) or delete (`None`) a value and persist immediately
    pub async fn update<T: Serialize>(&self, key: &str, value: Option<&T>) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut map = self.read_map().await?;
        match value {
            Some(value) => {
                map.insert(key.to_string(), serde_json::to_value(value)?);
            }
            None => {
                map.remove(key);
            }
        }

        self.write_map(&map).await?;
        debug!("State key {} written to {:?}", key, self.path);
        Ok(())
    }

    /// Read-modify-write one key under the write lock.
    ///
    /// `f` receives the current value and returns the new one (`None` deletes).
    /// Concurrent calls on the same store are serialized, so none is lost.
    pub async fn modify<T, F>(&self, key: &str, f: F) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> Option<T>,
    {
        let _guard = self.write_lock.lock().await;

        let mut map = self.read_map().await?;
        let current = match map.remove(key) {
            Some(value) => Some(serde_json::from_value(value)?),
            None => None,
        };

        if let Some(value) = f(current) {
            map.insert(key.to_string(), serde_json::to_value(&value)?);
        }

        self.write_map(&map).await?;
        debug!("State key {} modified in {:?}", key, self.path);
        Ok(())
    }

    async fn read_map(&self) -> Result<Map<String, Value>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&contents)? {
            Value::Object(map) => Ok(map),
            other => Err(CoreError::State(format!(
                "{:?} holds {} instead of an object",
                self.path,
                json_kind(&other)
            ))),
        }
    }

    async fn write_map(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(map)?;

        // A stale temp file would keep its old mode
        if let Err(e) = tokio::fs::remove_file(&tmp).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        if self.private {
            options.mode(0o600);
        }

        let mut file = options.open(&tmp).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Secret values (keystore passwords), kept apart from ordinary state and
/// readable only by the current user on Unix.
pub struct SecretStore {
    inner: StateStore,
}

impl SecretStore {
    pub fn open(data_dir: &Path) -> Self {
        Self {
            inner: StateStore::open_private(data_dir.join(SECRETS_FILE)),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    pub async fn store(&self, key: &str, secret: &str) -> Result<()> {
        self.inner.update(key, Some(&secret)).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.inner.update::<String>(key, None).await
    }
}

/// Stable file name for a project root
pub fn workspace_key(project_root: &Path) -> String {
    let canonical = std::fs::canonicalize(project_root).unwrap_or_else(|_| project_root.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    hex::encode(digest)[..16].to_string()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::global(dir.path());

        let value: Option<String> = store.get("anything").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_update_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::global(dir.path());
        store.update("android.gradle.module", Some(&":app")).await.unwrap();

        // A second handle sees the write without any shared memory
        let other = StateStore::global(dir.path());
        let value: Option<String> = other.get("android.gradle.module").await.unwrap();
        assert_eq!(value.as_deref(), Some(":app"));

        store.update::<String>("android.gradle.module", None).await.unwrap();
        let value: Option<String> = other.get("android.gradle.module").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::global(dir.path());
        std::fs::write(store.path(), "[1, 2, 3]").unwrap();

        assert!(store.get::<String>("key").await.is_err());
    }

    #[test]
    fn test_workspace_key_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let a = workspace_key(dir.path());
        let b = workspace_key(dir.path());
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        let other = tempfile::tempdir().unwrap();
        assert_ne!(a, workspace_key(other.path()));
    }

    #[tokio::test]
    async fn test_secret_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = SecretStore::open(dir.path());

        secrets.store("android.signing.storePassword", "hunter22").await.unwrap();
        assert_eq!(
            secrets.get("android.signing.storePassword").await.unwrap().as_deref(),
            Some("hunter22")
        );

        secrets.delete("android.signing.storePassword").await.unwrap();
        assert!(secrets.get("android.signing.storePassword").await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_secret_file_is_owner_only_from_the_start() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let secrets = SecretStore::open(dir.path());
        // Leftover temp file from an interrupted write
        std::fs::write(dir.path().join("secrets.json.tmp"), "{}").unwrap();

        secrets.store("android.signing.keyPassword", "hunter22").await.unwrap();

        let mode = std::fs::metadata(dir.path().join(SECRETS_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o077, 0, "mode was {:o}", mode);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_modify_keeps_every_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(StateStore::global(dir.path()));

        let tasks: Vec<_> = (0..8u32)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .modify::<Vec<u32>, _>("numbers", |current| {
                            let mut numbers = current.unwrap_or_default();
                            numbers.push(n);
                            Some(numbers)
                        })
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut numbers: Vec<u32> = store.get("numbers").await.unwrap().unwrap();
        numbers.sort_unstable();
        assert_eq!(numbers, (0..8).collect::<Vec<_>>());
    }
}
