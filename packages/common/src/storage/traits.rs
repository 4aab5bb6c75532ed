use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use super::error::StorageError;
use super::key::StorageKey;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Blobs to write together for one todo, committed in key order.
pub type BlobBatch = BTreeMap<StorageKey, Vec<u8>>;

/// Blob storage partitioned into one namespace per todo.
///
/// Nothing here participates in a database transaction. Callers that need
/// agreement with relational state must order their calls so that a failed
/// blob operation can be compensated by a relational rollback.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create the namespace for a todo. Fails if it already exists.
    async fn create_namespace(&self, todo_id: i64) -> Result<(), StorageError>;

    /// Recursively remove the namespace for a todo. Fails if it is absent.
    ///
    /// Removal is not reversible: if this fails partway, blobs already
    /// removed stay removed.
    async fn delete_namespace(&self, todo_id: i64) -> Result<(), StorageError>;

    /// Store a single blob. Fails if the key exists or the namespace is absent.
    async fn put(&self, todo_id: i64, key: &StorageKey, data: &[u8]) -> Result<(), StorageError>;

    /// Store a batch of blobs so that either all of them land or, on a best
    /// effort basis, none do.
    ///
    /// A failure does not guarantee that nothing was written. When a partial
    /// write could not be undone the error is [`StorageError::Inconsistent`]
    /// and names the keys that may be left behind.
    async fn put_batch(
        &self,
        todo_id: i64,
        batch: &BlobBatch,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError>;

    /// Retrieve all bytes of a blob.
    async fn get(&self, todo_id: i64, key: &StorageKey) -> Result<Vec<u8>, StorageError> {
        let mut reader = self.get_stream(todo_id, key).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Retrieve a blob as a streaming async reader.
    async fn get_stream(&self, todo_id: i64, key: &StorageKey) -> Result<BoxReader, StorageError>;

    /// Check whether a blob exists.
    async fn exists(&self, todo_id: i64, key: &StorageKey) -> Result<bool, StorageError>;

    /// Delete a single blob. Fails if it is absent.
    async fn delete(&self, todo_id: i64, key: &StorageKey) -> Result<(), StorageError>;

    /// List the keys stored in a todo's namespace, sorted.
    ///
    /// Entries whose names are not valid keys are skipped.
    async fn list(&self, todo_id: i64) -> Result<Vec<StorageKey>, StorageError>;

    /// Release any resources held by the store.
    async fn close(&self) {}
}
