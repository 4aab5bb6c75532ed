use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::{Queries, SqlStore, TodoError, ensure_active, parse_key};

/// Lower the file count, delete the attachment row, then delete its blob.
///
/// A blob that cannot be deleted restores the row and the count.
#[instrument(skip(store, cancel))]
pub(super) async fn run(
    store: &SqlStore,
    todo_id: i64,
    attachment_id: i64,
    cancel: &CancellationToken,
) -> Result<(), TodoError> {
    let blobs = Arc::clone(&store.blobs);
    let cancel = cancel.clone();

    store
        .exec_tx(move |txn| {
            Box::pin(async move {
                ensure_active(&cancel)?;
                let queries = Queries::new(txn);
                let row = queries
                    .get_attachment(todo_id, attachment_id)
                    .await?
                    .ok_or_else(|| TodoError::attachment_not_found(attachment_id))?;
                let key = parse_key(&row)?;

                queries.add_file_count(todo_id, -1).await?;
                if queries.delete_attachment(todo_id, attachment_id).await? == 0 {
                    return Err(TodoError::attachment_not_found(attachment_id));
                }

                ensure_active(&cancel)?;
                blobs.delete(todo_id, &key).await?;
                Ok(())
            })
        })
        .await?;

    info!(todo_id, attachment_id, "Attachment deleted");
    Ok(())
}
