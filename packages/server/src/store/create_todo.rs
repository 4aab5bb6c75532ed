use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::{NewTodo, Queries, SqlStore, TodoError, ensure_active};
use crate::entity::todo;

/// Insert the todo row, then create its blob namespace.
///
/// A namespace that cannot be created rolls the insert back.
#[instrument(skip_all, fields(owner = %new.owner))]
pub(super) async fn run(
    store: &SqlStore,
    new: NewTodo,
    cancel: &CancellationToken,
) -> Result<todo::Model, TodoError> {
    let blobs = Arc::clone(&store.blobs);
    let cancel = cancel.clone();

    let todo = store
        .exec_tx(move |txn| {
            Box::pin(async move {
                ensure_active(&cancel)?;
                let todo = Queries::new(txn).insert_todo(&new.owner, &new.title).await?;

                ensure_active(&cancel)?;
                blobs.create_namespace(todo.id).await?;
                Ok(todo)
            })
        })
        .await?;

    info!(todo_id = todo.id, "Todo created");
    Ok(todo)
}
