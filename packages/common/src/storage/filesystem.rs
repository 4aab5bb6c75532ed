use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::batch::{SafeBatchWriter, link_into_place};
use super::error::StorageError;
use super::key::StorageKey;
use super::traits::{BlobBatch, BlobStore, BoxReader};

/// Filesystem-backed blob store.
///
/// Each todo owns a directory named by its zero-padded id:
/// `{base_path}/{todo_id:08}/{key}`. Writes are staged in `{base_path}/.tmp`
/// so that publishing a blob is a rename within one filesystem.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
}

impl FilesystemBlobStore {
    /// Create a new filesystem blob store.
    pub async fn new(base_path: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self { base_path })
    }

    /// Directory holding the blobs of a todo.
    fn namespace_path(&self, todo_id: i64) -> PathBuf {
        self.base_path.join(format!("{todo_id:08}"))
    }

    fn blob_path(&self, todo_id: i64, key: &StorageKey) -> PathBuf {
        self.namespace_path(todo_id).join(key.as_str())
    }

    fn scratch_path(&self) -> PathBuf {
        self.base_path.join(".tmp")
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.scratch_path().join(uuid::Uuid::new_v4().to_string())
    }

    async fn require_namespace(&self, todo_id: i64) -> Result<PathBuf, StorageError> {
        let dir = self.namespace_path(todo_id);
        if !fs::try_exists(&dir).await? {
            return Err(StorageError::NamespaceNotFound(todo_id));
        }
        Ok(dir)
    }

    fn not_found(todo_id: i64, key: &StorageKey) -> StorageError {
        StorageError::NotFound {
            todo_id,
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn create_namespace(&self, todo_id: i64) -> Result<(), StorageError> {
        let dir = self.namespace_path(todo_id);
        match fs::create_dir(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::NamespaceExists(todo_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_namespace(&self, todo_id: i64) -> Result<(), StorageError> {
        let dir = self.require_namespace(todo_id).await?;
        fs::remove_dir_all(&dir)
            .await
            .map_err(|source| StorageError::PartialRemoval { todo_id, source })?;
        Ok(())
    }

    async fn put(&self, todo_id: i64, key: &StorageKey, data: &[u8]) -> Result<(), StorageError> {
        self.require_namespace(todo_id).await?;

        let blob_path = self.blob_path(todo_id, key);
        let temp_path = self.temp_path();
        if let Err(e) = fs::write(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        let result = link_into_place(todo_id, key, &temp_path, &blob_path).await;
        if result.is_err() {
            let _ = fs::remove_file(&temp_path).await;
        }
        result
    }

    async fn put_batch(
        &self,
        todo_id: i64,
        batch: &BlobBatch,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        let namespace = self.require_namespace(todo_id).await?;
        let scratch = self.scratch_path();
        SafeBatchWriter::new(todo_id, &namespace, &scratch)
            .write(batch, cancel)
            .await
    }

    async fn get_stream(&self, todo_id: i64, key: &StorageKey) -> Result<BoxReader, StorageError> {
        self.require_namespace(todo_id).await?;
        match fs::File::open(self.blob_path(todo_id, key)).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Self::not_found(todo_id, key))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, todo_id: i64, key: &StorageKey) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.blob_path(todo_id, key)).await?)
    }

    async fn delete(&self, todo_id: i64, key: &StorageKey) -> Result<(), StorageError> {
        self.require_namespace(todo_id).await?;
        match fs::remove_file(self.blob_path(todo_id, key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Self::not_found(todo_id, key))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, todo_id: i64) -> Result<Vec<StorageKey>, StorageError> {
        let dir = self.require_namespace(todo_id).await?;
        let mut entries = fs::read_dir(&dir).await?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            match name.to_str().map(StorageKey::parse) {
                Some(Ok(key)) => keys.push(key),
                _ => warn!(todo_id, name = ?name, "Skipping unexpected entry in namespace"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn close(&self) {
        info!(base_path = %self.base_path.display(), "Filesystem blob store closed");
    }
}
