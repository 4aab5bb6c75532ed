//! Todo and attachment persistence across the relational store and the blob store.
//!
//! Every mutation is a saga: the relational writes happen first inside a
//! transaction, the blob side effect runs inside the same transactional scope,
//! and a failed side effect rolls the transaction back. Blob writes are not
//! covered by the rollback, so a failure after the blob step can leave
//! orphaned blobs behind; see [`SqlStore::find_orphaned_blobs`].
//!
//! Sagas run on their own tokio task. A caller that goes away (a client
//! disconnecting mid-request) only stops waiting; the saga still reaches its
//! commit or its rollback and the blob cleanup that goes with it.

mod create_todo;
mod delete_attachment;
mod delete_todo;
mod error;
mod queries;
mod reconcile;
mod upload_attachment;

#[cfg(test)]
mod test_support;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use common::TodoStatus;
use common::storage::{BlobStore, BoxReader, StorageKey};
use futures::future::BoxFuture;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error};

use crate::entity::{attachment, todo};

pub use error::TodoError;
pub use queries::Queries;
pub use reconcile::OrphanReport;

/// Input of the create-todo saga.
#[derive(Debug, Clone)]
pub struct NewTodo {
    pub owner: String,
    pub title: String,
}

/// Fields of a todo to change. `None` leaves the field as it is.
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub title: Option<String>,
    pub status: Option<TodoStatus>,
}

/// One file of an upload, already accepted by the attachment policy.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    /// Display name. Never used to address storage.
    pub filename: String,
    pub data: Vec<u8>,
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub todo: todo::Model,
    /// Inserted rows, in the order the files were given.
    pub attachments: Vec<attachment::Model>,
}

/// Persistence capability used by the HTTP layer.
#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn create_todo(
        &self,
        new: NewTodo,
        cancel: &CancellationToken,
    ) -> Result<todo::Model, TodoError>;

    /// Delete a todo, its attachment rows, and its blob namespace.
    async fn delete_todo(&self, todo_id: i64, cancel: &CancellationToken) -> Result<(), TodoError>;

    async fn upload_attachments(
        &self,
        todo_id: i64,
        files: Vec<NewAttachment>,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, TodoError>;

    async fn delete_attachment(
        &self,
        todo_id: i64,
        attachment_id: i64,
        cancel: &CancellationToken,
    ) -> Result<(), TodoError>;

    /// Change the title and/or status of a todo. Attachments are untouched.
    async fn update_todo(&self, todo_id: i64, patch: TodoPatch) -> Result<todo::Model, TodoError>;

    async fn get_todo(&self, todo_id: i64) -> Result<todo::Model, TodoError>;

    async fn list_todos(
        &self,
        owner: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<todo::Model>, u64), TodoError>;

    async fn get_attachment(
        &self,
        todo_id: i64,
        attachment_id: i64,
    ) -> Result<attachment::Model, TodoError>;

    async fn list_attachments(&self, todo_id: i64) -> Result<Vec<attachment::Model>, TodoError>;

    /// Open an attachment's content for streaming.
    async fn open_attachment(
        &self,
        todo_id: i64,
        attachment_id: i64,
    ) -> Result<(attachment::Model, BoxReader), TodoError>;

    async fn find_orphaned_blobs(&self, todo_id: i64) -> Result<OrphanReport, TodoError>;
}

/// [`TodoStore`] over a sea-orm connection and a [`BlobStore`].
#[derive(Clone)]
pub struct SqlStore {
    db: DatabaseConnection,
    blobs: Arc<dyn BlobStore>,
}

impl SqlStore {
    pub fn new(db: DatabaseConnection, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, blobs }
    }

    /// Run `work` inside a transaction.
    ///
    /// Commits when `work` succeeds and rolls back when it fails. The error
    /// from `work` is returned as is, unless the rollback fails too, in which
    /// case both are reported as [`TodoError::Rollback`]. Blob operations
    /// issued by `work` are not undone by the rollback.
    pub async fn exec_tx<T, F>(&self, work: F) -> Result<T, TodoError>
    where
        T: Send,
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, TodoError>> + Send,
    {
        let txn = self.db.begin().await?;

        match work(&txn).await {
            Ok(value) => {
                txn.commit().await?;
                Ok(value)
            }
            Err(err) => match txn.rollback().await {
                Ok(()) => Err(err),
                Err(rollback) => {
                    error!(error = %err, rollback_error = %rollback, "Transaction rollback failed");
                    Err(TodoError::Rollback {
                        source: Box::new(err),
                        rollback,
                    })
                }
            },
        }
    }
}

/// Run a saga to completion on its own task and wait for its result.
async fn detached<T, Fut>(saga: Fut) -> Result<T, TodoError>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, TodoError>> + Send + 'static,
{
    tokio::spawn(saga.in_current_span()).await?
}

/// Fail with [`TodoError::Cancelled`] once the token has fired.
pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<(), TodoError> {
    if cancel.is_cancelled() {
        return Err(TodoError::Cancelled);
    }
    Ok(())
}

fn parse_key(row: &attachment::Model) -> Result<StorageKey, TodoError> {
    Ok(StorageKey::parse(&row.storage_filename)?)
}

#[async_trait]
impl TodoStore for SqlStore {
    async fn create_todo(
        &self,
        new: NewTodo,
        cancel: &CancellationToken,
    ) -> Result<todo::Model, TodoError> {
        let store = self.clone();
        let cancel = cancel.clone();
        detached(async move { create_todo::run(&store, new, &cancel).await }).await
    }

    async fn delete_todo(&self, todo_id: i64, cancel: &CancellationToken) -> Result<(), TodoError> {
        let store = self.clone();
        let cancel = cancel.clone();
        detached(async move { delete_todo::run(&store, todo_id, &cancel).await }).await
    }

    async fn upload_attachments(
        &self,
        todo_id: i64,
        files: Vec<NewAttachment>,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, TodoError> {
        let store = self.clone();
        let cancel = cancel.clone();
        detached(async move { upload_attachment::run(&store, todo_id, files, &cancel).await })
            .await
    }

    async fn delete_attachment(
        &self,
        todo_id: i64,
        attachment_id: i64,
        cancel: &CancellationToken,
    ) -> Result<(), TodoError> {
        let store = self.clone();
        let cancel = cancel.clone();
        detached(async move {
            delete_attachment::run(&store, todo_id, attachment_id, &cancel).await
        })
        .await
    }

    async fn update_todo(&self, todo_id: i64, patch: TodoPatch) -> Result<todo::Model, TodoError> {
        Queries::new(&self.db)
            .update_todo(todo_id, patch.title.as_deref(), patch.status)
            .await?
            .ok_or_else(|| TodoError::todo_not_found(todo_id))
    }

    async fn get_todo(&self, todo_id: i64) -> Result<todo::Model, TodoError> {
        Queries::new(&self.db)
            .get_todo(todo_id)
            .await?
            .ok_or_else(|| TodoError::todo_not_found(todo_id))
    }

    async fn list_todos(
        &self,
        owner: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<todo::Model>, u64), TodoError> {
        Ok(Queries::new(&self.db)
            .list_todos(owner, page, per_page)
            .await?)
    }

    async fn get_attachment(
        &self,
        todo_id: i64,
        attachment_id: i64,
    ) -> Result<attachment::Model, TodoError> {
        Queries::new(&self.db)
            .get_attachment(todo_id, attachment_id)
            .await?
            .ok_or_else(|| TodoError::attachment_not_found(attachment_id))
    }

    async fn list_attachments(&self, todo_id: i64) -> Result<Vec<attachment::Model>, TodoError> {
        let queries = Queries::new(&self.db);
        if queries.get_todo(todo_id).await?.is_none() {
            return Err(TodoError::todo_not_found(todo_id));
        }
        Ok(queries.list_attachments(todo_id).await?)
    }

    async fn open_attachment(
        &self,
        todo_id: i64,
        attachment_id: i64,
    ) -> Result<(attachment::Model, BoxReader), TodoError> {
        let row = self.get_attachment(todo_id, attachment_id).await?;
        let key = parse_key(&row)?;
        let reader = self.blobs.get_stream(todo_id, &key).await?;
        Ok((row, reader))
    }

    async fn find_orphaned_blobs(&self, todo_id: i64) -> Result<OrphanReport, TodoError> {
        reconcile::run(self, todo_id).await
    }
}
