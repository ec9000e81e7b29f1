use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::path::PathBuf;
use tracing::debug;

use crate::errors::ServiceError;

/// Narrow contract over the photo blob store. The core never walks the
/// namespace; it only reads, writes, and deletes by path.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn get(&self, path: &str) -> Result<Bytes, ServiceError>;
    async fn put(&self, path: &str, bytes: Bytes) -> Result<String, ServiceError>;
    async fn delete(&self, path: &str) -> Result<(), ServiceError>;
}

/// Filesystem-backed store rooted at a configured directory.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ServiceError> {
        // Paths are issued by this service; reject anything trying to walk up.
        if path.contains("..") {
            return Err(ServiceError::StorageError(format!(
                "invalid blob path: {}",
                path
            )));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn get(&self, path: &str) -> Result<Bytes, ServiceError> {
        let full = self.resolve(path)?;
        let data = tokio::fs::read(&full)
            .await
            .map_err(|e| ServiceError::StorageError(format!("read {}: {}", path, e)))?;
        Ok(Bytes::from(data))
    }

    async fn put(&self, path: &str, bytes: Bytes) -> Result<String, ServiceError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ServiceError::StorageError(format!("mkdir {}: {}", path, e)))?;
        }
        tokio::fs::write(&full, &bytes)
            .await
            .map_err(|e| ServiceError::StorageError(format!("write {}: {}", path, e)))?;
        debug!(%path, bytes = bytes.len(), "blob stored");
        Ok(path.to_string())
    }

    async fn delete(&self, path: &str) -> Result<(), ServiceError> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            // Compensating cleanup must be idempotent.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServiceError::StorageError(format!(
                "delete {}: {}",
                path, e
            ))),
        }
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<String, Bytes>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(&self, path: &str) -> Result<Bytes, ServiceError> {
        self.blobs
            .get(path)
            .map(|b| b.clone())
            .ok_or_else(|| ServiceError::StorageError(format!("blob not found: {}", path)))
    }

    async fn put(&self, path: &str, bytes: Bytes) -> Result<String, ServiceError> {
        self.blobs.insert(path.to_string(), bytes);
        Ok(path.to_string())
    }

    async fn delete(&self, path: &str) -> Result<(), ServiceError> {
        self.blobs.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_store_round_trip_and_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path());

        let path = store
            .put("photos/a/b.jpg", Bytes::from_static(b"jpeg-bytes"))
            .await
            .expect("put");
        let read = store.get(&path).await.expect("get");
        assert_eq!(read.as_ref(), b"jpeg-bytes");

        store.delete(&path).await.expect("delete");
        assert!(store.get(&path).await.is_err());
        // Deleting again is a no-op, not an error.
        store.delete(&path).await.expect("idempotent delete");
    }

    #[tokio::test]
    async fn local_store_rejects_traversal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path());
        assert!(store.get("../etc/passwd").await.is_err());
    }
}
