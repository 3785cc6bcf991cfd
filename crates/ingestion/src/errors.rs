//! Import error types
//!
//! Only source-level failures are errors. Problems with individual rows are
//! recorded in the [`crate::report::ImportReport`] instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Source file not found: {0}")]
    SourceNotFound(String),

    #[error("Could not read {path}: {message}")]
    SourceUnreadable { path: String, message: String },

    #[error("Unsupported source format '{extension}' (expected .csv, .xlsx, .xlsm, .xls, .xlsb or .ods)")]
    UnsupportedFormat { extension: String },

    #[error("Sheet '{sheet}' not found (available: {available})")]
    SheetNotFound { sheet: String, available: String },

    #[error("Missing required headers: {}", .0.join(", "))]
    MissingHeaders(Vec<String>),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<aidboard_common::errors::AppError> for IngestionError {
    fn from(e: aidboard_common::errors::AppError) -> Self {
        IngestionError::DatabaseError(e.to_string())
    }
}
