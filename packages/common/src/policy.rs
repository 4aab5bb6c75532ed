//! Limits checked before an attachment upload is allowed to start.
//!
//! The check reads the todo's current `file_count` before, and outside of,
//! the transaction that later increments it. Two uploads racing on the same
//! todo can therefore both pass and together exceed `max_files`.

use serde::Deserialize;
use thiserror::Error;

pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_PDF: &str = "application/pdf";
pub const IMAGE_JPEG: &str = "image/jpeg";
pub const IMAGE_JPG: &str = "image/jpg";
pub const IMAGE_PNG: &str = "image/png";

/// App-level attachment limits.
#[derive(Debug, Deserialize, Clone)]
pub struct AttachmentPolicy {
    /// Maximum number of attachments per todo. Default: 5.
    #[serde(default = "default_max_files")]
    pub max_files: i32,
    /// Maximum size of a single file in bytes. Default: 2 MiB.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Maximum combined size of one upload request in bytes. Default: 10 MiB.
    #[serde(default = "default_max_request_size")]
    pub max_request_size: u64,
    /// Accepted content types, compared case-insensitively.
    #[serde(default = "default_allowed_content_types")]
    pub allowed_content_types: Vec<String>,
}

fn default_max_files() -> i32 {
    5
}
fn default_max_file_size() -> u64 {
    2 << 20
}
fn default_max_request_size() -> u64 {
    10 << 20
}
fn default_allowed_content_types() -> Vec<String> {
    [TEXT_PLAIN, APPLICATION_PDF, IMAGE_JPEG, IMAGE_JPG, IMAGE_PNG]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_size: default_max_file_size(),
            max_request_size: default_max_request_size(),
            allowed_content_types: default_allowed_content_types(),
        }
    }
}

/// What the gate needs to know about one uploaded file.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub filename: String,
    /// Content type declared by the client, if any.
    pub content_type: Option<String>,
    pub size: u64,
}

/// Reason an upload was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("No files were provided")]
    Empty,

    #[error("Todo already has {current} attachments, the maximum is {max}")]
    LimitReached { current: i32, max: i32 },

    #[error("Uploading {incoming} files would exceed the limit of {max} (already {current})")]
    TooManyFiles {
        current: i32,
        incoming: usize,
        max: i32,
    },

    #[error("File '{filename}' is {size} bytes, the limit is {limit}")]
    FileTooLarge {
        filename: String,
        size: u64,
        limit: u64,
    },

    #[error("Upload is {total} bytes, the limit is {limit}")]
    RequestTooLarge { total: u64, limit: u64 },

    #[error("File '{filename}' has unsupported content type '{content_type}'")]
    UnsupportedMediaType {
        filename: String,
        content_type: String,
    },
}

impl AttachmentPolicy {
    /// Check an upload of `files` to a todo that currently has `current_count`
    /// attachments.
    pub fn check(&self, current_count: i32, files: &[IncomingFile]) -> Result<(), PolicyViolation> {
        if files.is_empty() {
            return Err(PolicyViolation::Empty);
        }

        if current_count >= self.max_files {
            return Err(PolicyViolation::LimitReached {
                current: current_count,
                max: self.max_files,
            });
        }

        let incoming = files.len();
        if i64::from(current_count) + incoming as i64 > i64::from(self.max_files) {
            return Err(PolicyViolation::TooManyFiles {
                current: current_count,
                incoming,
                max: self.max_files,
            });
        }

        let total: u64 = files.iter().map(|f| f.size).sum();
        if total > self.max_request_size {
            return Err(PolicyViolation::RequestTooLarge {
                total,
                limit: self.max_request_size,
            });
        }

        for file in files {
            let content_type = effective_content_type(file);
            if !self.is_allowed(&content_type) {
                return Err(PolicyViolation::UnsupportedMediaType {
                    filename: file.filename.clone(),
                    content_type,
                });
            }
            if file.size > self.max_file_size {
                return Err(PolicyViolation::FileTooLarge {
                    filename: file.filename.clone(),
                    size: file.size,
                    limit: self.max_file_size,
                });
            }
        }

        Ok(())
    }

    fn is_allowed(&self, content_type: &str) -> bool {
        self.allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(content_type))
    }
}

/// The declared content type without parameters, or a guess from the
/// filename when none was declared.
fn effective_content_type(file: &IncomingFile) -> String {
    let declared = file
        .content_type
        .as_deref()
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty());

    declared.unwrap_or_else(|| {
        mime_guess::from_path(&file.filename)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string())
    })
}
