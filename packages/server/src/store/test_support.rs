use std::sync::Arc;

use common::storage::filesystem::FilesystemBlobStore;
use common::storage::memory::MemoryBlobStore;
use sea_orm::DatabaseConnection;
use tempfile::TempDir;

use super::{NewAttachment, NewTodo, SqlStore};
use crate::config::DatabaseConfig;
use crate::database::init_db;

/// Connect to a fresh SQLite file inside `dir` with the schema in place.
pub(crate) async fn sqlite(dir: &TempDir) -> DatabaseConnection {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("todo.db").display());
    let mut config = DatabaseConfig::new(url);
    config.min_connections = 1;
    config.max_connections = 4;
    config.sqlx_logging = false;
    init_db(&config).await.unwrap()
}

pub(crate) async fn memory_store() -> (SqlStore, Arc<MemoryBlobStore>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = sqlite(&dir).await;
    let blobs = Arc::new(MemoryBlobStore::new());
    let store = SqlStore::new(db, blobs.clone());
    (store, blobs, dir)
}

pub(crate) async fn filesystem_store() -> (SqlStore, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = sqlite(&dir).await;
    let blobs = FilesystemBlobStore::new(dir.path().join("blobs"))
        .await
        .unwrap();
    (SqlStore::new(db, Arc::new(blobs)), dir)
}

pub(crate) fn new_todo(owner: &str, title: &str) -> NewTodo {
    NewTodo {
        owner: owner.to_string(),
        title: title.to_string(),
    }
}

pub(crate) fn file(filename: &str, data: &[u8]) -> NewAttachment {
    NewAttachment {
        filename: filename.to_string(),
        data: data.to_vec(),
    }
}
