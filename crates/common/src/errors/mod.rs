//! Error types for PaperBot
//!
//! Provides a single error enum shared by the store, the feed and metadata
//! clients and the exporter, with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // Resource errors (4xxx)
    PaperNotFound,

    // Conflict errors (5xxx)
    CycleInProgress,

    // Storage errors (7xxx)
    StorageError,

    // Upstream errors (8xxx)
    NetworkError,
    ParseError,

    // Export errors (85xx)
    ExportError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1003,

            ErrorCode::PaperNotFound => 4002,

            ErrorCode::CycleInProgress => 5001,

            ErrorCode::StorageError => 7001,

            ErrorCode::NetworkError => 8001,
            ErrorCode::ParseError => 8002,

            ErrorCode::ExportError => 8501,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Resource errors
    #[error("Paper not found: {id}")]
    PaperNotFound { id: i32 },

    // Conflict errors
    #[error("A fetch cycle is already running")]
    CycleInProgress,

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] sea_orm::DbErr),

    // Upstream errors
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Parse error: {message}")]
    Parse { message: String },

    // Export errors
    #[error("Export failed: {message}")]
    Export { message: String },

    // Internal errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::PaperNotFound { .. } => ErrorCode::PaperNotFound,
            AppError::CycleInProgress => ErrorCode::CycleInProgress,
            AppError::Storage(_) => ErrorCode::StorageError,
            AppError::Network { .. } | AppError::HttpClient(_) => ErrorCode::NetworkError,
            AppError::Parse { .. } => ErrorCode::ParseError,
            AppError::Export { .. } => ErrorCode::ExportError,
            AppError::Other(_) => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::InvalidFormat { .. } => {
                StatusCode::BAD_REQUEST
            }

            // 404 Not Found
            AppError::PaperNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::CycleInProgress => StatusCode::CONFLICT,

            // 500 Internal Server Error
            AppError::Storage(_)
            | AppError::Export { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Network { .. } | AppError::HttpClient(_) | AppError::Parse { .. } => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Per-source and per-record faults; the cycle skips them and continues
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            AppError::Network { .. } | AppError::HttpClient(_) | AppError::Parse { .. }
        )
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = code.as_code(),
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = code.as_code(),
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Export {
            message: err.to_string(),
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Export {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::PaperNotFound { id: 42 };
        assert_eq!(err.code(), ErrorCode::PaperNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.code().as_code(), 4002);

        let err = AppError::Validation {
            message: "subdir escapes the export root".into(),
        };
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_upstream_errors_are_skippable() {
        let network = AppError::Network {
            message: "timed out".into(),
        };
        let parse = AppError::Parse {
            message: "unexpected EOF".into(),
        };
        assert!(network.is_skippable());
        assert!(parse.is_skippable());
        assert_eq!(network.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_storage_error_is_terminal() {
        let err = AppError::Storage(sea_orm::DbErr::Custom("disk I/O error".into()));
        assert!(!err.is_skippable());
        assert!(err.is_server_error());
        assert_eq!(err.code(), ErrorCode::StorageError);
    }

    #[test]
    fn test_io_error_maps_to_export() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: AppError = io.into();
        assert_eq!(err.code(), ErrorCode::ExportError);
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_cycle_in_progress_is_conflict() {
        let err = AppError::CycleInProgress;
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(err.is_client_error());
    }
}
