use common::storage::StorageError;
use sea_orm::DbErr;
use thiserror::Error;

/// Failure of a store query or saga.
#[derive(Debug, Error)]
pub enum TodoError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Metadata and blob storage may disagree and need manual reconciliation.
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// The unit of work failed and so did the rollback that followed it.
    #[error("tx err: {source}, rb err: {rollback}")]
    Rollback {
        source: Box<TodoError>,
        rollback: DbErr,
    },

    #[error("Operation cancelled")]
    Cancelled,

    /// The task running a saga panicked or was aborted.
    #[error("Saga task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<StorageError> for TodoError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Inconsistent { .. } | StorageError::PartialRemoval { .. } => {
                TodoError::Consistency(err.to_string())
            }
            StorageError::Cancelled => TodoError::Cancelled,
            other => TodoError::Storage(other),
        }
    }
}

impl TodoError {
    pub(crate) fn todo_not_found(id: i64) -> Self {
        TodoError::NotFound(format!("Todo {id}"))
    }

    pub(crate) fn attachment_not_found(id: i64) -> Self {
        TodoError::NotFound(format!("Attachment {id}"))
    }
}
