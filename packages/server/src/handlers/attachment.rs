use axum::Json;
use axum::body::Body;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use common::policy::{AttachmentPolicy, IncomingFile, PolicyViolation};
use tokio_util::io::ReaderStream;
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::attachment::{
    AttachmentListResponse, AttachmentResponse, UploadAttachmentsResponse,
};
use crate::models::todo::TodoResponse;
use crate::state::AppState;
use crate::store::NewAttachment;
use crate::utils::filename::{content_disposition_value, display_name};

/// Multipart field carrying the uploaded files. May repeat.
pub const ATTACHMENTS_FIELD: &str = "attachments";

/// Allowance for multipart boundaries and part headers on top of the content.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

pub fn attachment_upload_body_limit(policy: &AttachmentPolicy) -> DefaultBodyLimit {
    let limit = policy.max_request_size.saturating_add(MULTIPART_OVERHEAD);
    DefaultBodyLimit::max(usize::try_from(limit).unwrap_or(usize::MAX))
}

#[instrument(skip(state, multipart))]
pub async fn upload_attachments(
    State(state): State<AppState>,
    Path(todo_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let policy = &state.config.attachment;

    // Read outside the saga; concurrent uploads may both pass the cap check.
    let todo = state.store.get_todo(todo_id).await?;
    if todo.file_count >= policy.max_files {
        return Err(PolicyViolation::LimitReached {
            current: todo.file_count,
            max: policy.max_files,
        }
        .into());
    }

    let mut incoming = Vec::new();
    let mut files = Vec::new();
    let mut total: u64 = 0;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(ATTACHMENTS_FIELD) {
            return Err(AppError::Validation(format!(
                "Form should only contain files in the '{ATTACHMENTS_FIELD}' field"
            )));
        }

        let raw_name = field.file_name().map(str::to_string).ok_or_else(|| {
            AppError::Validation("Every attachment must have a filename".into())
        })?;
        let filename =
            display_name(&raw_name).map_err(|e| AppError::Validation(e.message().into()))?;
        let content_type = field.content_type().map(str::to_string);

        let data = read_field(field, policy, &mut total).await?;
        incoming.push(IncomingFile {
            filename: filename.clone(),
            content_type,
            size: data.len() as u64,
        });
        files.push(NewAttachment { filename, data });
    }

    policy.check(todo.file_count, &incoming)?;

    let outcome = state
        .store
        .upload_attachments(todo_id, files, &state.shutdown)
        .await?;
    info!(
        todo_id,
        uploaded = outcome.attachments.len(),
        "Upload accepted"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadAttachmentsResponse {
            todo: TodoResponse::from(outcome.todo),
            attachments: outcome
                .attachments
                .into_iter()
                .map(AttachmentResponse::from)
                .collect(),
        }),
    ))
}

#[instrument(skip(state))]
pub async fn list_attachments(
    State(state): State<AppState>,
    Path(todo_id): Path<i64>,
) -> Result<Json<AttachmentListResponse>, AppError> {
    let rows = state.store.list_attachments(todo_id).await?;

    let total = rows.len() as u64;
    let attachments = rows.into_iter().map(AttachmentResponse::from).collect();

    Ok(Json(AttachmentListResponse { attachments, total }))
}

#[instrument(skip(state))]
pub async fn download_attachment(
    State(state): State<AppState>,
    Path((todo_id, attachment_id)): Path<(i64, i64)>,
) -> Result<Response, AppError> {
    let (row, reader) = state.store.open_attachment(todo_id, attachment_id).await?;

    let content_type = mime_guess::from_path(&row.original_filename)
        .first_raw()
        .unwrap_or("application/octet-stream");
    let body = Body::from_stream(ReaderStream::new(reader));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_value(&row.original_filename),
        )
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

#[instrument(skip(state))]
pub async fn delete_attachment(
    State(state): State<AppState>,
    Path((todo_id, attachment_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    state
        .store
        .delete_attachment(todo_id, attachment_id, &state.shutdown)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Buffer one multipart field, failing as soon as a size limit is crossed.
async fn read_field(
    mut field: Field<'_>,
    policy: &AttachmentPolicy,
    total: &mut u64,
) -> Result<Vec<u8>, AppError> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let mut data = Vec::new();

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        *total += chunk.len() as u64;
        if *total > policy.max_request_size {
            return Err(PolicyViolation::RequestTooLarge {
                total: *total,
                limit: policy.max_request_size,
            }
            .into());
        }
        if (data.len() + chunk.len()) as u64 > policy.max_file_size {
            return Err(PolicyViolation::FileTooLarge {
                filename,
                size: (data.len() + chunk.len()) as u64,
                limit: policy.max_file_size,
            }
            .into());
        }
        data.extend_from_slice(&chunk);
    }

    Ok(data)
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge(err.body_text());
    }
    AppError::Validation(format!("Multipart error: {}", err.body_text()))
}
