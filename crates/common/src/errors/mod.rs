//! Error types for AidBoard services
//!
//! `AppError` is what repository, aggregation and summary code return.
//! Each variant carries a machine-readable [`ErrorCode`] and an HTTP status,
//! and renders as a JSON [`ErrorResponse`] when returned from a handler.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Machine-readable error identifiers, grouped in numeric families
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Request problems (1xxx)
    ValidationError,
    MissingField,

    // Lookups (4xxx)
    ProjectNotFound,
    CountryNotFound,

    // Conflicts (5xxx)
    DuplicateExternalId,

    // Storage (7xxx)
    DatabaseError,
    ConnectionError,

    // Text generation (8xxx)
    SummaryError,

    // Internal (9xxx)
    InternalError,
    ConfigurationError,
}

impl ErrorCode {
    /// Numeric form, stable across releases
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::ProjectNotFound => 4002,
            ErrorCode::CountryNotFound => 4003,
            ErrorCode::DuplicateExternalId => 5002,
            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,
            ErrorCode::SummaryError => 8002,
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Project not found: {id}")]
    ProjectNotFound { id: String },

    #[error("Country not found: {name}")]
    CountryNotFound { name: String },

    #[error("External id already used by another project: {external_id}")]
    DuplicateExternalId { external_id: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Summary service error: {message}")]
    SummaryError { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            AppError::CountryNotFound { .. } => ErrorCode::CountryNotFound,
            AppError::DuplicateExternalId { .. } => ErrorCode::DuplicateExternalId,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::SummaryError { .. } => ErrorCode::SummaryError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::MissingField { .. } => StatusCode::BAD_REQUEST,

            AppError::ProjectNotFound { .. } | AppError::CountryNotFound { .. } => {
                StatusCode::NOT_FOUND
            }

            AppError::DuplicateExternalId { .. } => StatusCode::CONFLICT,

            AppError::Database(_)
            | AppError::Internal { .. }
            | AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,

            AppError::SummaryError { .. } => StatusCode::BAD_GATEWAY,

            AppError::DatabaseConnection { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Field the error points at, when there is one
    fn field(&self) -> Option<&str> {
        match self {
            AppError::Validation { field, .. } => field.as_deref(),
            AppError::MissingField { field } => Some(field),
            _ => None,
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(error = %message, code = ?code, status = status.as_u16(), "Server error");
        } else {
            tracing::warn!(error = %message, code = ?code, status = status.as_u16(), "Client error");
        }

        let details = self.field().map(|field| serde_json::json!({ "field": field }));

        let body = ErrorResponse {
            error: ErrorDetails { code, message, details },
        };

        (status, Json(body)).into_response()
    }
}
