use std::sync::Arc;

use common::storage::StorageError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use super::{Queries, SqlStore, TodoError, ensure_active};

/// Delete the attachment rows and the todo row, then remove the namespace.
///
/// A namespace that cannot be removed rolls the deletes back. Blobs removed
/// before the failure stay removed.
#[instrument(skip(store, cancel))]
pub(super) async fn run(
    store: &SqlStore,
    todo_id: i64,
    cancel: &CancellationToken,
) -> Result<(), TodoError> {
    let blobs = Arc::clone(&store.blobs);
    let cancel = cancel.clone();

    store
        .exec_tx(move |txn| {
            Box::pin(async move {
                ensure_active(&cancel)?;
                let queries = Queries::new(txn);
                let attachments = queries.delete_attachments_of(todo_id).await?;
                if queries.delete_todo(todo_id).await? == 0 {
                    return Err(TodoError::todo_not_found(todo_id));
                }

                ensure_active(&cancel)?;
                if let Err(e) = blobs.delete_namespace(todo_id).await {
                    // The metadata comes back but some of its blobs may not.
                    if matches!(e, StorageError::PartialRemoval { .. }) {
                        error!(
                            todo_id,
                            attachments,
                            error = %e,
                            "Namespace partially removed; attachments may be missing content"
                        );
                    }
                    return Err(e.into());
                }
                Ok(())
            })
        })
        .await?;

    info!(todo_id, "Todo deleted");
    Ok(())
}
