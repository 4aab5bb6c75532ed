use chrono::{DateTime, Utc};
use serde::Serialize;

use super::todo::TodoResponse;
use crate::entity::attachment;

/// Response DTO for a single attachment. The storage key is not exposed.
#[derive(Debug, Serialize)]
pub struct AttachmentResponse {
    pub id: i64,
    pub todo_id: i64,
    /// Original upload filename.
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

/// Response DTO for listing attachments.
#[derive(Serialize)]
pub struct AttachmentListResponse {
    pub attachments: Vec<AttachmentResponse>,
    pub total: u64,
}

#[derive(Serialize)]
pub struct UploadAttachmentsResponse {
    pub todo: TodoResponse,
    pub attachments: Vec<AttachmentResponse>,
}

impl From<attachment::Model> for AttachmentResponse {
    fn from(model: attachment::Model) -> Self {
        Self {
            id: model.id,
            todo_id: model.todo_id,
            filename: model.original_filename,
            created_at: model.created_at,
        }
    }
}
