//! Blob store collaborator.
//!
//! Blobs are opaque byte payloads keyed by a controller-assigned id. The
//! upload action only needs [`BlobStore::write`]; [`LocalBlobStore`] keeps
//! blobs as files in a directory on the node.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::system::is_path_component;

/// Errors from blob store operations.
#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("Invalid blob id '{0}'")]
    InvalidBlobId(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failure reported by a store backend, passed through verbatim.
    #[error("{0}")]
    Backend(String),
}

/// Durable sink for blobs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `content` under `blob_id`, replacing any previous blob.
    async fn write(&self, blob_id: &str, content: &[u8]) -> Result<(), BlobStoreError>;
}

/// Blobs stored as `<dir>/<blob_id>`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    dir: PathBuf,
}

impl LocalBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a blob. The id must be a single path component.
    pub fn path(&self, blob_id: &str) -> Result<PathBuf, BlobStoreError> {
        if !is_path_component(blob_id) || blob_id.starts_with('.') {
            return Err(BlobStoreError::InvalidBlobId(blob_id.to_string()));
        }
        Ok(self.dir.join(blob_id))
    }

    pub async fn read(&self, blob_id: &str) -> Result<Vec<u8>, BlobStoreError> {
        let path = self.path(blob_id)?;
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BlobStoreError::NotFound(blob_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, blob_id: &str) -> Result<bool, BlobStoreError> {
        let path = self.path(blob_id)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    /// Remove a blob. Removing a missing blob is not an error.
    pub async fn delete(&self, blob_id: &str) -> Result<(), BlobStoreError> {
        let path = self.path(blob_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(blob_id = %blob_id, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_temp(&self, temp_path: &Path, content: &[u8]) -> io::Result<()> {
        let mut file = tokio::fs::File::create(temp_path).await?;
        file.write_all(content).await?;
        file.sync_all().await
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    /// Written to a temporary file and renamed into place.
    async fn write(&self, blob_id: &str, content: &[u8]) -> Result<(), BlobStoreError> {
        let path = self.path(blob_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let temp_path = self
            .dir
            .join(format!(".{blob_id}.{}.tmp", Uuid::new_v4().simple()));

        let result = match self.write_temp(&temp_path, content).await {
            Ok(()) => tokio::fs::rename(&temp_path, &path).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(
                        path = %temp_path.display(),
                        error = %cleanup,
                        "Failed to remove temporary blob"
                    );
                }
            }
            return Err(e.into());
        }

        debug!(blob_id = %blob_id, size_bytes = content.len(), "Wrote blob");
        Ok(())
    }
}

/// In-memory store that records writes, for tests.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    writes: Mutex<Vec<(String, Vec<u8>)>>,
    write_error: Mutex<Option<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later write fail with `message`.
    pub fn fail_writes(&self, message: &str) {
        *lock(&self.write_error) = Some(message.to_string());
    }

    /// Every write call in order, including failed ones.
    pub fn writes(&self) -> Vec<(String, Vec<u8>)> {
        lock(&self.writes).clone()
    }

    pub fn get(&self, blob_id: &str) -> Option<Vec<u8>> {
        lock(&self.blobs).get(blob_id).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn write(&self, blob_id: &str, content: &[u8]) -> Result<(), BlobStoreError> {
        lock(&self.writes).push((blob_id.to_string(), content.to_vec()));

        if let Some(message) = lock(&self.write_error).clone() {
            return Err(BlobStoreError::Backend(message));
        }

        lock(&self.blobs).insert(blob_id.to_string(), content.to_vec());
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_write_and_read() {
        let temp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp.path().join("blobs"));

        store.write("blob-1", b"hello").await.unwrap();

        assert!(store.exists("blob-1").await.unwrap());
        assert_eq!(store.read("blob-1").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_local_write_replaces() {
        let temp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp.path());

        store.write("blob-1", b"one").await.unwrap();
        store.write("blob-1", b"two").await.unwrap();

        assert_eq!(store.read("blob-1").await.unwrap(), b"two");
        let entries: Vec<_> = std::fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temporary files left behind");
    }

    #[tokio::test]
    async fn test_local_rejects_path_ids() {
        let temp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp.path());

        for id in ["", "..", "a/b", ".hidden"] {
            let err = store.write(id, b"x").await.unwrap_err();
            assert!(matches!(err, BlobStoreError::InvalidBlobId(_)), "{id}");
        }
    }

    #[tokio::test]
    async fn test_local_read_missing() {
        let temp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp.path());

        let err = store.read("missing").await.unwrap_err();
        assert!(matches!(err, BlobStoreError::NotFound(_)));
        assert!(!store.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_delete() {
        let temp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp.path());

        store.write("blob-1", b"x").await.unwrap();
        store.delete("blob-1").await.unwrap();
        store.delete("blob-1").await.unwrap();

        assert!(!store.exists("blob-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_failure_is_recorded() {
        let store = MemoryBlobStore::new();
        store.fail_writes("blob write error");

        let err = store.write("id", b"x").await.unwrap_err();

        assert_eq!(err.to_string(), "blob write error");
        assert_eq!(store.writes().len(), 1);
        assert!(store.get("id").is_none());
    }
}
