//! Ingestion error types

use paperbot_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Storage error: {0}")]
    Storage(AppError),

    #[error("Export error: {0}")]
    Export(AppError),

    #[error("A fetch cycle is already running")]
    CycleInProgress,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<AppError> for IngestionError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Export { .. } | AppError::Validation { .. } => IngestionError::Export(e),
            AppError::Configuration { message } => IngestionError::Configuration(message),
            other => IngestionError::Storage(other),
        }
    }
}

impl From<IngestionError> for AppError {
    fn from(e: IngestionError) -> Self {
        match e {
            IngestionError::Storage(inner) | IngestionError::Export(inner) => inner,
            IngestionError::CycleInProgress => AppError::CycleInProgress,
            IngestionError::Configuration(message) => AppError::Configuration { message },
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestionError>;
