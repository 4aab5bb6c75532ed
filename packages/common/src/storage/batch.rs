//! Stage-then-commit writer for filesystem batches.
//!
//! Every blob is first written to its own file in the scratch directory. Only
//! when all of them are staged are they renamed into the todo namespace, one
//! by one in key order. A failed rename moves the already published files back
//! to scratch and then deletes all staged files.
//!
//! This is not atomic. If moving a published file back fails, that file stays
//! in the namespace and the error returned is [`StorageError::Inconsistent`].
//!
//! Publishing hard-links the staged file into place and then unlinks it from
//! scratch. Unlike `rename`, `link` fails when the destination exists, so a
//! blob that appears concurrently is never replaced.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::error::StorageError;
use super::key::StorageKey;
use super::traits::BlobBatch;

/// One blob staged in scratch, waiting to be published.
#[derive(Debug)]
pub(crate) struct StagedBlob {
    pub(crate) key: StorageKey,
    pub(crate) temp_path: PathBuf,
    pub(crate) final_path: PathBuf,
}

pub(crate) struct SafeBatchWriter<'a> {
    todo_id: i64,
    namespace: &'a Path,
    scratch: &'a Path,
    /// Runs after a failed publish and before the revert.
    #[cfg(test)]
    before_revert: Option<Box<dyn Fn() + Send + Sync>>,
}

impl<'a> SafeBatchWriter<'a> {
    pub(crate) fn new(todo_id: i64, namespace: &'a Path, scratch: &'a Path) -> Self {
        Self {
            todo_id,
            namespace,
            scratch,
            #[cfg(test)]
            before_revert: None,
        }
    }

    pub(crate) async fn write(
        &self,
        batch: &BlobBatch,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        let mut staged: Vec<StagedBlob> = Vec::with_capacity(batch.len());

        for (key, data) in batch {
            if cancel.is_cancelled() {
                remove_staged(&staged).await;
                return Err(StorageError::Cancelled);
            }

            let entry = StagedBlob {
                key: key.clone(),
                temp_path: self.scratch.join(Uuid::new_v4().to_string()),
                final_path: self.namespace.join(key.as_str()),
            };
            let result = write_temp(&entry.temp_path, data).await;
            staged.push(entry);

            if let Err(e) = result {
                error!(todo_id = self.todo_id, key = %key, error = %e, "Failed to stage blob");
                remove_staged(&staged).await;
                return Err(e.into());
            }
        }

        let mut published = 0;
        let mut failure = None;
        for entry in &staged {
            if cancel.is_cancelled() {
                failure = Some(StorageError::Cancelled);
                break;
            }
            if let Err(e) = self.publish(entry).await {
                error!(
                    todo_id = self.todo_id,
                    key = %entry.key,
                    error = %e,
                    "Failed to publish staged blob"
                );
                failure = Some(e);
                break;
            }
            published += 1;
        }

        let Some(err) = failure else {
            debug!(todo_id = self.todo_id, count = staged.len(), "Batch published");
            return Ok(());
        };

        #[cfg(test)]
        if let Some(hook) = &self.before_revert {
            hook();
        }

        let unreverted = revert_published(self.todo_id, &staged[..published]).await;
        remove_staged(&staged).await;

        if unreverted.is_empty() {
            warn!(
                todo_id = self.todo_id,
                reverted = published,
                "Batch write failed; published blobs were reverted"
            );
            return Err(err);
        }

        let keys: Vec<String> = unreverted.iter().map(|k| k.to_string()).collect();
        error!(
            todo_id = self.todo_id,
            keys = ?keys,
            error = %err,
            "Batch write failed and could not be fully reverted; blobs may be orphaned"
        );
        Err(StorageError::Inconsistent {
            todo_id: self.todo_id,
            source: Box::new(err),
            unreverted: keys,
        })
    }

    /// Move a staged file to its final path, refusing to replace an existing blob.
    async fn publish(&self, entry: &StagedBlob) -> Result<(), StorageError> {
        link_into_place(self.todo_id, &entry.key, &entry.temp_path, &entry.final_path).await
    }
}

/// Publish `temp` at `dest` without ever replacing an existing file.
///
/// The scratch link is removed afterwards; if that fails the blob is still
/// published and the leftover scratch file is only logged.
pub(crate) async fn link_into_place(
    todo_id: i64,
    key: &StorageKey,
    temp: &Path,
    dest: &Path,
) -> Result<(), StorageError> {
    match fs::hard_link(temp, dest).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(StorageError::AlreadyExists {
                todo_id,
                key: key.to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    }
    if let Err(e) = fs::remove_file(temp).await {
        warn!(todo_id, key = %key, error = %e, "Failed to unlink published blob from scratch");
    }
    Ok(())
}

async fn write_temp(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

/// Move published blobs back to scratch. Returns the keys that could not be
/// moved and therefore remain in the namespace.
pub(crate) async fn revert_published(todo_id: i64, published: &[StagedBlob]) -> Vec<StorageKey> {
    let mut unreverted = Vec::new();
    for entry in published {
        match fs::try_exists(&entry.final_path).await {
            Ok(false) => {
                warn!(todo_id, key = %entry.key, "Published blob vanished before revert");
                continue;
            }
            Ok(true) => {}
            Err(e) => {
                warn!(todo_id, key = %entry.key, error = %e, "Failed to stat published blob");
                unreverted.push(entry.key.clone());
                continue;
            }
        }
        if let Err(e) = fs::rename(&entry.final_path, &entry.temp_path).await {
            warn!(todo_id, key = %entry.key, error = %e, "Failed to revert published blob");
            unreverted.push(entry.key.clone());
        }
    }
    unreverted
}

/// Delete whatever staged files still exist in scratch.
async fn remove_staged(staged: &[StagedBlob]) {
    for entry in staged {
        match fs::remove_file(&entry.temp_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %entry.temp_path.display(), error = %e, "Failed to remove staged file");
            }
        }
    }
}
