use serde::Serialize;

use crate::error::AppError;

/// Longest accepted todo title, in characters.
pub const MAX_TITLE_LEN: usize = 255;

/// Pagination metadata included in list responses.
#[derive(Debug, Serialize)]
pub struct Pagination {
    /// Current page number (1-based).
    pub page: u64,
    /// Number of items per page.
    pub per_page: u64,
    /// Total number of matching items across all pages.
    pub total: u64,
    /// Total number of pages.
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(page: u64, per_page: u64, total: u64) -> Self {
        Self {
            page,
            per_page,
            total,
            total_pages: total.div_ceil(per_page),
        }
    }
}

/// Validate a trimmed title (1-255 Unicode characters).
pub fn validate_title(title: &str) -> Result<(), AppError> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "Title must be 1-{MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate a trimmed owner name (non-empty).
pub fn validate_owner(owner: &str) -> Result<(), AppError> {
    if owner.trim().is_empty() {
        return Err(AppError::Validation("Owner must not be empty".into()));
    }
    Ok(())
}
