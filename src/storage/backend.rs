//! Storage Backends
//!
//! String key/value persistence in the shape of a browser key/value store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{SessionError, StorageError};

/// Key/value storage interface.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: String) -> Result<(), SessionError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), SessionError>;
}

/// In-memory storage backend.
#[derive(Default)]
pub struct InMemoryStorageBackend {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryStorageBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored key.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorageBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), SessionError> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// File-backed storage: one JSON object holding every key.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash mid-write leaves the previous document intact.
pub struct FileStorageBackend {
    path: PathBuf,
    io_lock: tokio::sync::Mutex<()>,
}

impl FileStorageBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<HashMap<String, String>, SessionError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(StorageError::ReadFailed {
                    message: format!("{}: {}", self.path.display(), e),
                }
                .into())
            }
        };

        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }

        serde_json::from_str(&raw).map_err(|e| {
            StorageError::CorruptedData {
                message: format!("{}: {}", self.path.display(), e),
            }
            .into()
        })
    }

    async fn write_document(&self, document: &HashMap<String, String>) -> Result<(), SessionError> {
        let write_failed = |e: &dyn std::fmt::Display| -> SessionError {
            StorageError::WriteFailed {
                message: format!("{}: {}", self.path.display(), e),
            }
            .into()
        };

        let raw = serde_json::to_string_pretty(document).map_err(|e| write_failed(&e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_failed(&e))?;
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(|e| write_failed(&e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| write_failed(&e))
    }
}

#[async_trait]
impl StorageBackend for FileStorageBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let _guard = self.io_lock.lock().await;
        Ok(self.read_document().await?.remove(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), SessionError> {
        let _guard = self.io_lock.lock().await;
        // An unreadable document is replaced rather than blocking every write.
        let mut document = self.read_document().await.unwrap_or_default();
        document.insert(key.to_string(), value);
        self.write_document(&document).await
    }

    async fn remove(&self, key: &str) -> Result<(), SessionError> {
        let _guard = self.io_lock.lock().await;
        let mut document = match self.read_document().await {
            Ok(document) => document,
            Err(e) => {
                return Err(StorageError::DeleteFailed {
                    message: e.to_string(),
                }
                .into())
            }
        };
        if document.remove(key).is_some() {
            self.write_document(&document).await?;
        }
        Ok(())
    }
}

/// Mock storage backend for testing.
#[derive(Default)]
pub struct MockStorageBackend {
    values: Mutex<HashMap<String, String>>,
    set_history: Mutex<Vec<(String, String)>>,
    remove_history: Mutex<Vec<String>>,
    fail_reads: Mutex<bool>,
    fail_writes: Mutex<bool>,
}

impl MockStorageBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a raw value.
    pub fn insert_raw(&self, key: &str, value: &str) -> &Self {
        self.values.lock().insert(key.to_string(), value.to_string());
        self
    }

    /// Make every read fail.
    pub fn set_fail_reads(&self, fail: bool) -> &Self {
        *self.fail_reads.lock() = fail;
        self
    }

    /// Make every write and remove fail, as a full quota would.
    pub fn set_fail_writes(&self, fail: bool) -> &Self {
        *self.fail_writes.lock() = fail;
        self
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    pub fn get_set_history(&self) -> Vec<(String, String)> {
        self.set_history.lock().clone()
    }

    pub fn get_remove_history(&self) -> Vec<String> {
        self.remove_history.lock().clone()
    }
}

#[async_trait]
impl StorageBackend for MockStorageBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        if *self.fail_reads.lock() {
            return Err(StorageError::ReadFailed {
                message: "Mock storage read failure".to_string(),
            }
            .into());
        }
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), SessionError> {
        if *self.fail_writes.lock() {
            return Err(StorageError::WriteFailed {
                message: "Mock storage quota exceeded".to_string(),
            }
            .into());
        }
        self.set_history
            .lock()
            .push((key.to_string(), value.clone()));
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SessionError> {
        if *self.fail_writes.lock() {
            return Err(StorageError::DeleteFailed {
                message: "Mock storage failure".to_string(),
            }
            .into());
        }
        self.remove_history.lock().push(key.to_string());
        self.values.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_backend() {
        let backend = InMemoryStorageBackend::new();
        backend.set("a", "1".to_string()).await.unwrap();
        assert_eq!(backend.get("a").await.unwrap(), Some("1".to_string()));

        backend.remove("a").await.unwrap();
        backend.remove("a").await.unwrap();
        assert_eq!(backend.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_backend_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sessions.json");

        let backend = FileStorageBackend::new(&path);
        backend.set("active_user", "u1".to_string()).await.unwrap();
        backend.set("other", "x".to_string()).await.unwrap();
        backend.remove("other").await.unwrap();

        let reopened = FileStorageBackend::new(&path);
        assert_eq!(
            reopened.get("active_user").await.unwrap(),
            Some("u1".to_string())
        );
        assert_eq!(reopened.get("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_backend_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileStorageBackend::new(dir.path().join("absent.json"));
        assert_eq!(backend.get("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_backend_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, "{not json").unwrap();

        let backend = FileStorageBackend::new(&path);
        assert!(matches!(
            backend.get("k").await,
            Err(SessionError::Storage(StorageError::CorruptedData { .. }))
        ));

        // Writing replaces the corrupt document.
        backend.set("k", "v".to_string()).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_mock_backend_failures() {
        let backend = MockStorageBackend::new();
        backend.set_fail_writes(true);
        assert!(backend.set("k", "v".to_string()).await.is_err());
        assert!(backend.get_set_history().is_empty());

        backend.set_fail_writes(false).set_fail_reads(true);
        backend.set("k", "v".to_string()).await.unwrap();
        assert!(backend.get("k").await.is_err());
        assert_eq!(backend.raw("k"), Some("v".to_string()));
    }
}
