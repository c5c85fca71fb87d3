//! PaperBot Common Library
//!
//! Shared code for the PaperBot binaries including:
//! - Paper store models and repository
//! - Feed fetching and parsing
//! - Metadata enrichment and abstract reconstruction
//! - Export formats
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod errors;
pub mod export;
pub mod feeds;
pub mod metadata;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository, SortKey, StatusCounts};
pub use errors::{AppError, Result};
pub use export::{ExportFormat, Exporter};
pub use feeds::{CandidateRecord, FeedSource, SourceFetcher};
pub use metadata::MetadataProvider;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
