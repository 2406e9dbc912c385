//! Blob storage for uploaded files.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use common::FileId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by a blob store.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Blob not found: {0}")]
    NotFound(FileId),

    #[error("Blob I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blob metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Blob store rejected write: {0}")]
    Rejected(String),
}

/// Descriptive data stored next to the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
}

/// A stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub metadata: BlobMetadata,
    pub data: Vec<u8>,
}

/// Identifier-addressed storage for uploaded files.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores a blob under `id`, replacing anything already there.
    async fn put(&self, id: FileId, metadata: BlobMetadata, data: Vec<u8>)
    -> Result<(), BlobError>;

    /// Loads a blob.
    async fn get(&self, id: FileId) -> Result<Blob, BlobError>;

    /// Deletes a blob. Deleting a missing blob is not an error.
    async fn delete(&self, id: FileId) -> Result<(), BlobError>;
}

#[derive(Debug, Default)]
struct InMemoryBlobState {
    blobs: HashMap<FileId, Blob>,
    puts: usize,
    fail_after: Option<usize>,
}

/// In-memory blob store, used when no blob directory is configured.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStore {
    state: Arc<RwLock<InMemoryBlobState>>,
}

impl InMemoryBlobStore {
    /// Creates a new empty blob store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryBlobState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryBlobState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures the store to fail every write.
    pub fn set_fail_on_put(&self, fail: bool) {
        self.set_fail_after(fail.then_some(0));
    }

    /// Lets `n` more writes succeed, then fails the rest. `None` disables.
    pub fn set_fail_after(&self, n: Option<usize>) {
        let mut state = self.write();
        state.puts = 0;
        state.fail_after = n;
    }

    /// Returns the number of stored blobs.
    pub fn blob_count(&self) -> usize {
        self.read().blobs.len()
    }

    /// Returns true if a blob exists with the given id.
    pub fn contains(&self, id: FileId) -> bool {
        self.read().blobs.contains_key(&id)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(
        &self,
        id: FileId,
        metadata: BlobMetadata,
        data: Vec<u8>,
    ) -> Result<(), BlobError> {
        let mut state = self.write();

        if let Some(limit) = state.fail_after
            && state.puts >= limit
        {
            return Err(BlobError::Rejected("blob store unavailable".to_string()));
        }

        state.puts += 1;
        state.blobs.insert(id, Blob { metadata, data });
        Ok(())
    }

    async fn get(&self, id: FileId) -> Result<Blob, BlobError> {
        let state = self.read();
        state.blobs.get(&id).cloned().ok_or(BlobError::NotFound(id))
    }

    async fn delete(&self, id: FileId) -> Result<(), BlobError> {
        self.write().blobs.remove(&id);
        Ok(())
    }
}

/// Filesystem blob store.
///
/// Each blob is written as `<root>/<id>` with a `<root>/<id>.json` metadata
/// sidecar.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Creates a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn data_path(&self, id: FileId) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn metadata_path(&self, id: FileId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    #[tracing::instrument(skip(self, metadata, data), fields(size = data.len()))]
    async fn put(
        &self,
        id: FileId,
        metadata: BlobMetadata,
        data: Vec<u8>,
    ) -> Result<(), BlobError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let sidecar = serde_json::to_vec(&metadata)?;
        let data_path = self.data_path(id);
        tokio::fs::write(&data_path, &data).await?;

        // Metadata goes last: a blob without a sidecar is not visible to `get`.
        if let Err(e) = tokio::fs::write(self.metadata_path(id), sidecar).await {
            if let Err(cleanup) = remove_if_exists(&data_path).await {
                tracing::warn!(file_id = %id, error = %cleanup, "failed to remove orphaned blob data");
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn get(&self, id: FileId) -> Result<Blob, BlobError> {
        let raw = match tokio::fs::read(self.metadata_path(id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(BlobError::NotFound(id)),
            Err(e) => return Err(e.into()),
        };
        let metadata: BlobMetadata = serde_json::from_slice(&raw)?;

        let data = match tokio::fs::read(self.data_path(id)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(BlobError::NotFound(id)),
            Err(e) => return Err(e.into()),
        };

        Ok(Blob { metadata, data })
    }

    async fn delete(&self, id: FileId) -> Result<(), BlobError> {
        remove_if_exists(&self.metadata_path(id)).await?;
        remove_if_exists(&self.data_path(id)).await?;
        Ok(())
    }
}
