use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::policy::PolicyViolation;
use sea_orm::DbErr;
use serde::Serialize;

use crate::store::TodoError;

/// Structured error response returned by all endpoints on failure.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`,
    /// `ATTACHMENT_LIMIT`, `PAYLOAD_TOO_LARGE`, `UNSUPPORTED_MEDIA_TYPE`,
    /// `NOT_FOUND`, `INTERNAL_ERROR`.
    pub code: &'static str,
    /// Human-readable error description.
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    /// The todo already holds the maximum number of attachments.
    AttachmentLimit(String),
    PayloadTooLarge(String),
    UnsupportedMediaType(String),
    NotFound(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::AttachmentLimit(msg) => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "ATTACHMENT_LIMIT",
                    message: msg,
                },
            ),
            AppError::PayloadTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorBody {
                    code: "PAYLOAD_TOO_LARGE",
                    message: msg,
                },
            ),
            AppError::UnsupportedMediaType(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ErrorBody {
                    code: "UNSUPPORTED_MEDIA_TYPE",
                    message: msg,
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<TodoError> for AppError {
    fn from(err: TodoError) -> Self {
        match err {
            TodoError::Validation(msg) => AppError::Validation(msg),
            TodoError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<PolicyViolation> for AppError {
    fn from(err: PolicyViolation) -> Self {
        let msg = err.to_string();
        match err {
            PolicyViolation::Empty => AppError::Validation(msg),
            PolicyViolation::LimitReached { .. } => AppError::AttachmentLimit(msg),
            PolicyViolation::TooManyFiles { .. }
            | PolicyViolation::FileTooLarge { .. }
            | PolicyViolation::RequestTooLarge { .. } => AppError::PayloadTooLarge(msg),
            PolicyViolation::UnsupportedMediaType { .. } => AppError::UnsupportedMediaType(msg),
        }
    }
}
