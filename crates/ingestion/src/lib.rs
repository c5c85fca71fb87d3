//! PaperBot ingestion
//!
//! Fetch cycles over the configured feeds, plus the curation flows
//! (pick, export) shared by the CLI and the gateway.

pub mod curation;
pub mod errors;
pub mod orchestrator;
pub mod pipeline;
pub mod session;

pub use curation::{filter_by_query, CurationService, ExportOutcome, QueryField};
pub use errors::IngestionError;
pub use orchestrator::{default_worker_count, CycleTicket, FetchOrchestrator, FetchRun, FetchState, FetchStatus};
pub use pipeline::{CycleSummary, IngestionPipeline};
pub use session::SelectionGuard;
