use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common::TodoStatus;
use tracing::instrument;

use crate::error::AppError;
use crate::extractors::json::AppJson;
use crate::models::shared::{Pagination, validate_owner, validate_title};
use crate::models::todo::{
    CreateTodoRequest, TodoListQuery, TodoListResponse, TodoResponse, UpdateTodoRequest,
};
use crate::state::AppState;
use crate::store::{NewTodo, TodoPatch};

#[instrument(skip(state, payload))]
pub async fn create_todo(
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateTodoRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_owner(&payload.owner)?;
    validate_title(&payload.title)?;

    let new = NewTodo {
        owner: payload.owner.trim().to_string(),
        title: payload.title.trim().to_string(),
    };
    let todo = state.store.create_todo(new, &state.shutdown).await?;

    Ok((StatusCode::CREATED, Json(TodoResponse::from(todo))))
}

#[instrument(skip(state, query))]
pub async fn list_todos(
    State(state): State<AppState>,
    Query(query): Query<TodoListQuery>,
) -> Result<Json<TodoListResponse>, AppError> {
    let page = Ord::max(query.page.unwrap_or(1), 1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let owner = query
        .owner
        .as_deref()
        .map(str::trim)
        .filter(|o| !o.is_empty());

    let (todos, total) = state.store.list_todos(owner, page, per_page).await?;

    Ok(Json(TodoListResponse {
        data: todos.into_iter().map(TodoResponse::from).collect(),
        pagination: Pagination::new(page, per_page, total),
    }))
}

#[instrument(skip(state))]
pub async fn get_todo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TodoResponse>, AppError> {
    let todo = state.store.get_todo(id).await?;
    Ok(Json(TodoResponse::from(todo)))
}

#[instrument(skip(state, payload))]
pub async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<UpdateTodoRequest>,
) -> Result<Json<TodoResponse>, AppError> {
    if payload.title.is_none() && payload.status.is_none() {
        return Err(AppError::Validation(
            "Provide a title, a status, or both".into(),
        ));
    }

    let title = match payload.title {
        Some(title) => {
            validate_title(&title)?;
            Some(title.trim().to_string())
        }
        None => None,
    };
    let status = payload
        .status
        .as_deref()
        .map(TodoStatus::from_str)
        .transpose()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let todo = state
        .store
        .update_todo(id, TodoPatch { title, status })
        .await?;
    Ok(Json(TodoResponse::from(todo)))
}

#[instrument(skip(state))]
pub async fn delete_todo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.store.delete_todo(id, &state.shutdown).await?;
    Ok(StatusCode::NO_CONTENT)
}
