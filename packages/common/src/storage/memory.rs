use std::collections::BTreeMap;
use std::io::Cursor;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tokio_util::sync::CancellationToken;

use super::error::StorageError;
use super::key::StorageKey;
use super::traits::{BlobBatch, BlobStore, BoxReader};

/// Operations of [`MemoryBlobStore`] that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlobOp {
    CreateNamespace,
    DeleteNamespace,
    Put,
    PutBatch,
    Delete,
}

impl BlobOp {
    fn name(self) -> &'static str {
        match self {
            Self::CreateNamespace => "create_namespace",
            Self::DeleteNamespace => "delete_namespace",
            Self::Put => "put",
            Self::PutBatch => "put_batch",
            Self::Delete => "delete",
        }
    }
}

/// In-memory blob store for tests.
///
/// Failures can be injected per operation with [`MemoryBlobStore::fail_on`];
/// a failing operation leaves the stored state untouched. With
/// [`MemoryBlobStore::fail_partway_on`] the operation does part of its work
/// first, the way a filesystem can fail midway.
#[derive(Default)]
pub struct MemoryBlobStore {
    namespaces: DashMap<i64, BTreeMap<StorageKey, Vec<u8>>>,
    failing: DashSet<BlobOp>,
    partway: DashSet<BlobOp>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of `op` fail until [`Self::heal`] is called.
    pub fn fail_on(&self, op: BlobOp) {
        self.failing.insert(op);
    }

    /// Make `op` fail after doing part of its work.
    ///
    /// A batch publishes its first half (at least one blob), keeps it, and
    /// reports [`StorageError::Inconsistent`]. A namespace removal drops its
    /// first half of blobs and reports [`StorageError::PartialRemoval`].
    /// Other operations are unaffected.
    pub fn fail_partway_on(&self, op: BlobOp) {
        self.partway.insert(op);
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        self.failing.clear();
        self.partway.clear();
    }

    /// Whether a namespace exists for the todo.
    pub fn has_namespace(&self, todo_id: i64) -> bool {
        self.namespaces.contains_key(&todo_id)
    }

    /// Number of blobs stored for the todo.
    pub fn blob_count(&self, todo_id: i64) -> usize {
        self.namespaces.get(&todo_id).map(|ns| ns.len()).unwrap_or(0)
    }

    fn check(&self, op: BlobOp) -> Result<(), StorageError> {
        if self.failing.contains(&op) {
            return Err(StorageError::Injected(op.name()));
        }
        Ok(())
    }

    fn not_found(todo_id: i64, key: &StorageKey) -> StorageError {
        StorageError::NotFound {
            todo_id,
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn create_namespace(&self, todo_id: i64) -> Result<(), StorageError> {
        self.check(BlobOp::CreateNamespace)?;
        match self.namespaces.entry(todo_id) {
            Entry::Occupied(_) => Err(StorageError::NamespaceExists(todo_id)),
            Entry::Vacant(slot) => {
                slot.insert(BTreeMap::new());
                Ok(())
            }
        }
    }

    async fn delete_namespace(&self, todo_id: i64) -> Result<(), StorageError> {
        self.check(BlobOp::DeleteNamespace)?;
        if self.partway.contains(&BlobOp::DeleteNamespace) {
            let mut ns = self
                .namespaces
                .get_mut(&todo_id)
                .ok_or(StorageError::NamespaceNotFound(todo_id))?;
            let doomed: Vec<StorageKey> = ns.keys().take(ns.len().div_ceil(2)).cloned().collect();
            for key in &doomed {
                ns.remove(key);
            }
            return Err(StorageError::PartialRemoval {
                todo_id,
                source: std::io::Error::other("injected failure on delete_namespace"),
            });
        }
        self.namespaces
            .remove(&todo_id)
            .map(|_| ())
            .ok_or(StorageError::NamespaceNotFound(todo_id))
    }

    async fn put(&self, todo_id: i64, key: &StorageKey, data: &[u8]) -> Result<(), StorageError> {
        self.check(BlobOp::Put)?;
        let mut ns = self
            .namespaces
            .get_mut(&todo_id)
            .ok_or(StorageError::NamespaceNotFound(todo_id))?;
        if ns.contains_key(key) {
            return Err(StorageError::AlreadyExists {
                todo_id,
                key: key.to_string(),
            });
        }
        ns.insert(key.clone(), data.to_vec());
        Ok(())
    }

    async fn put_batch(
        &self,
        todo_id: i64,
        batch: &BlobBatch,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        self.check(BlobOp::PutBatch)?;
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        let mut ns = self
            .namespaces
            .get_mut(&todo_id)
            .ok_or(StorageError::NamespaceNotFound(todo_id))?;
        if let Some(key) = batch.keys().find(|k| ns.contains_key(*k)) {
            return Err(StorageError::AlreadyExists {
                todo_id,
                key: key.to_string(),
            });
        }
        if self.partway.contains(&BlobOp::PutBatch) {
            let published = batch.len().div_ceil(2).max(1);
            let mut unreverted = Vec::with_capacity(published);
            for (key, data) in batch.iter().take(published) {
                ns.insert(key.clone(), data.clone());
                unreverted.push(key.to_string());
            }
            return Err(StorageError::Inconsistent {
                todo_id,
                source: Box::new(StorageError::Injected(BlobOp::PutBatch.name())),
                unreverted,
            });
        }
        for (key, data) in batch {
            ns.insert(key.clone(), data.clone());
        }
        Ok(())
    }

    async fn get(&self, todo_id: i64, key: &StorageKey) -> Result<Vec<u8>, StorageError> {
        let ns = self
            .namespaces
            .get(&todo_id)
            .ok_or(StorageError::NamespaceNotFound(todo_id))?;
        ns.get(key)
            .cloned()
            .ok_or_else(|| Self::not_found(todo_id, key))
    }

    async fn get_stream(&self, todo_id: i64, key: &StorageKey) -> Result<BoxReader, StorageError> {
        let data = self.get(todo_id, key).await?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn exists(&self, todo_id: i64, key: &StorageKey) -> Result<bool, StorageError> {
        Ok(self
            .namespaces
            .get(&todo_id)
            .is_some_and(|ns| ns.contains_key(key)))
    }

    async fn delete(&self, todo_id: i64, key: &StorageKey) -> Result<(), StorageError> {
        self.check(BlobOp::Delete)?;
        let mut ns = self
            .namespaces
            .get_mut(&todo_id)
            .ok_or(StorageError::NamespaceNotFound(todo_id))?;
        ns.remove(key)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(todo_id, key))
    }

    async fn list(&self, todo_id: i64) -> Result<Vec<StorageKey>, StorageError> {
        let ns = self
            .namespaces
            .get(&todo_id)
            .ok_or(StorageError::NamespaceNotFound(todo_id))?;
        Ok(ns.keys().cloned().collect())
    }
}
