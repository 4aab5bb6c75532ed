use chrono::{DateTime, Utc};
use common::TodoStatus;
use serde::{Deserialize, Serialize};

use super::shared::Pagination;
use crate::entity::todo;

#[derive(Deserialize)]
pub struct CreateTodoRequest {
    pub owner: String,
    pub title: String,
}

/// Partial update of a todo. At least one field must be present.
#[derive(Deserialize)]
pub struct UpdateTodoRequest {
    pub title: Option<String>,
    /// `incomplete` or `complete`.
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct TodoListQuery {
    pub owner: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TodoResponse {
    pub id: i64,
    pub owner: String,
    pub title: String,
    pub status: TodoStatus,
    /// Number of attachments currently stored for the todo.
    pub file_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct TodoListResponse {
    pub data: Vec<TodoResponse>,
    pub pagination: Pagination,
}

impl From<todo::Model> for TodoResponse {
    fn from(m: todo::Model) -> Self {
        Self {
            id: m.id,
            owner: m.owner,
            title: m.title,
            status: m.status,
            file_count: m.file_count,
            created_at: m.created_at,
        }
    }
}
