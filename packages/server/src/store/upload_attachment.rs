use std::sync::Arc;

use common::storage::{BlobBatch, StorageKey};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::{NewAttachment, Queries, SqlStore, TodoError, UploadOutcome, ensure_active};

/// Record a batch of attachments and write their content.
///
/// Inside one transaction the file count is raised by the batch size, one row
/// per file is inserted under a fresh storage key, and the whole batch is
/// handed to the blob store in a single call. A failed batch write rolls back
/// the count and the rows.
#[instrument(skip(store, files, cancel), fields(files = files.len()))]
pub(super) async fn run(
    store: &SqlStore,
    todo_id: i64,
    files: Vec<NewAttachment>,
    cancel: &CancellationToken,
) -> Result<UploadOutcome, TodoError> {
    if files.is_empty() {
        return Err(TodoError::Validation("no files to upload".into()));
    }
    let added = i32::try_from(files.len())
        .map_err(|_| TodoError::Validation(format!("too many files: {}", files.len())))?;

    let blobs = Arc::clone(&store.blobs);
    let cancel = cancel.clone();

    let outcome = store
        .exec_tx(move |txn| {
            Box::pin(async move {
                ensure_active(&cancel)?;
                let queries = Queries::new(txn);
                let todo = queries.add_file_count(todo_id, added).await?;

                let mut batch = BlobBatch::new();
                let mut attachments = Vec::with_capacity(files.len());
                for file in files {
                    let key = StorageKey::generate();
                    let row = queries
                        .insert_attachment(todo_id, &file.filename, &key)
                        .await?;
                    attachments.push(row);
                    batch.insert(key, file.data);
                }

                ensure_active(&cancel)?;
                blobs.put_batch(todo_id, &batch, &cancel).await?;

                Ok(UploadOutcome { todo, attachments })
            })
        })
        .await?;

    info!(
        todo_id,
        file_count = outcome.todo.file_count,
        "Attachments uploaded"
    );
    Ok(outcome)
}
