use std::collections::BTreeSet;

use common::storage::StorageKey;
use serde::Serialize;
use tracing::{instrument, warn};

use super::{Queries, SqlStore, TodoError};

/// Disagreement between a todo's attachment rows and its blob namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrphanReport {
    pub todo_id: i64,
    /// Blobs in the namespace that no attachment row references.
    pub orphaned_blobs: Vec<StorageKey>,
    /// Attachment ids whose blob is missing from the namespace.
    pub missing_blobs: Vec<i64>,
}

impl OrphanReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_blobs.is_empty() && self.missing_blobs.is_empty()
    }
}

/// Compare the namespace of a todo with its attachment rows. Reports only,
/// never deletes.
#[instrument(skip(store))]
pub(super) async fn run(store: &SqlStore, todo_id: i64) -> Result<OrphanReport, TodoError> {
    let queries = Queries::new(&store.db);
    if queries.get_todo(todo_id).await?.is_none() {
        return Err(TodoError::todo_not_found(todo_id));
    }

    let rows = queries.list_attachments(todo_id).await?;
    let stored: BTreeSet<StorageKey> = store.blobs.list(todo_id).await?.into_iter().collect();

    let mut referenced = BTreeSet::new();
    let mut missing_blobs = Vec::new();
    for row in &rows {
        match StorageKey::parse(&row.storage_filename) {
            Ok(key) => {
                if !stored.contains(&key) {
                    missing_blobs.push(row.id);
                }
                referenced.insert(key);
            }
            Err(e) => {
                warn!(todo_id, attachment_id = row.id, error = %e, "Attachment has an invalid storage key");
                missing_blobs.push(row.id);
            }
        }
    }

    let orphaned_blobs: Vec<StorageKey> = stored.difference(&referenced).cloned().collect();

    let report = OrphanReport {
        todo_id,
        orphaned_blobs,
        missing_blobs,
    };
    if !report.is_clean() {
        warn!(
            todo_id,
            orphaned = ?report.orphaned_blobs,
            missing = ?report.missing_blobs,
            "Attachment rows and blob namespace disagree"
        );
    }
    Ok(report)
}
