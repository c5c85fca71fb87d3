//! Fetch cycle
//!
//! archive stale `new` papers → fetch every source → upsert sequentially.
//! The cycle is the only writer during a run.

use crate::errors::{IngestionError, Result};
use crate::orchestrator::{default_worker_count, CycleTicket, FetchOrchestrator, FetchState};
use futures::StreamExt;
use paperbot_common::config::AppConfig;
use paperbot_common::db::Repository;
use paperbot_common::feeds::{FeedSource, HttpFeedFetcher};
use paperbot_common::metadata::create_provider;
use paperbot_common::metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Initial status message of a cycle
pub const STARTING_MESSAGE: &str = "Fetching feeds...";

/// Outcome of one fetch cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub cycle_id: Uuid,
    pub archived: u64,
    pub new: u64,
    pub processed: u64,
    pub source_errors: Vec<String>,
}

impl CycleSummary {
    pub fn message(&self) -> String {
        let mut message = format!("Done: {} new, {} processed", self.new, self.processed);
        if self.archived > 0 {
            message.push_str(&format!(" ({} archived)", self.archived));
        }
        message
    }
}

/// Owns the fetch cycle over a repository and a source list
#[derive(Clone)]
pub struct IngestionPipeline {
    repository: Repository,
    orchestrator: Arc<FetchOrchestrator>,
    sources: Arc<Vec<FeedSource>>,
    max_workers: usize,
}

impl IngestionPipeline {
    pub fn new(
        repository: Repository,
        orchestrator: Arc<FetchOrchestrator>,
        sources: Vec<FeedSource>,
        max_workers: usize,
    ) -> Self {
        Self {
            repository,
            orchestrator,
            sources: Arc::new(sources),
            max_workers,
        }
    }

    /// Wire the HTTP fetcher, metadata provider and source list from config.
    ///
    /// `max_workers` overrides `fetch.max_workers`; enrichment runs only when
    /// both `enrich` and `fetch.enrich` are set.
    pub fn from_config(
        config: &AppConfig,
        repository: Repository,
        enrich: bool,
        max_workers: Option<usize>,
    ) -> Result<Self> {
        let fetcher = HttpFeedFetcher::new(config.feed_timeout())
            .map_err(|e| IngestionError::Configuration(e.to_string()))?;
        let provider = create_provider(enrich && config.fetch.enrich, &config.metadata)
            .map_err(|e| IngestionError::Configuration(e.to_string()))?;
        let orchestrator = Arc::new(FetchOrchestrator::new(
            Arc::new(fetcher),
            provider,
            config.fetch.enrich_concurrency,
        ));

        let sources = config.feed_sources()?;
        if sources.is_empty() {
            tracing::warn!(path = %config.feeds.path.display(), "No feed sources configured");
        }

        let workers = max_workers
            .or(config.fetch.max_workers)
            .unwrap_or_else(default_worker_count);
        Ok(Self::new(repository, orchestrator, sources, workers))
    }

    pub fn sources(&self) -> &[FeedSource] {
        &self.sources
    }

    pub fn fetch_state(&self) -> &FetchState {
        self.orchestrator.state()
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator {
        &self.orchestrator
    }

    /// Run one cycle, failing fast if another one holds the slot
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        let ticket = self
            .fetch_state()
            .try_begin(STARTING_MESSAGE)
            .ok_or(IngestionError::CycleInProgress)?;
        self.run_with_ticket(ticket).await
    }

    /// Run one cycle under an already claimed ticket
    pub async fn run_with_ticket(&self, ticket: CycleTicket) -> Result<CycleSummary> {
        let cycle_id = Uuid::new_v4();

        match self.execute(cycle_id, &ticket).await {
            Ok(summary) => {
                ticket.finish(summary.message());
                Ok(summary)
            }
            Err(e) => {
                error!(cycle_id = %cycle_id, error = %e, "Fetch cycle failed");
                ticket.finish(format!("Error: {}", e));
                Err(e)
            }
        }
    }

    #[instrument(skip_all, fields(cycle_id = %cycle_id))]
    async fn execute(&self, cycle_id: Uuid, ticket: &CycleTicket) -> Result<CycleSummary> {
        let started = Instant::now();
        info!(sources = self.sources.len(), workers = self.max_workers, "Fetch cycle started");

        let archived = self.repository.archive_old_new().await?;
        if archived > 0 {
            info!(archived, "Archived papers from previous cycles");
        }

        let mut run = self
            .orchestrator
            .fetch_all(self.sources.as_ref().clone(), self.max_workers);

        let mut new = 0u64;
        let mut processed = 0u64;
        while let Some(candidate) = run.next().await {
            if self.repository.upsert(&candidate).await? {
                new += 1;
            }
            processed += 1;

            if processed % 50 == 0 {
                ticket.update(format!("{}: {} processed", STARTING_MESSAGE, processed));
            }
        }

        let summary = CycleSummary {
            cycle_id,
            archived,
            new,
            processed,
            source_errors: run.errors(),
        };

        let elapsed = started.elapsed().as_secs_f64();
        metrics::record_cycle(elapsed, archived, new, processed);
        info!(
            new,
            processed,
            archived,
            failed_sources = summary.source_errors.len(),
            elapsed_secs = elapsed,
            "Fetch cycle finished"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use paperbot_common::db::DbPool;
    use paperbot_common::feeds::{CandidateRecord, FeedError, SourceFetcher};
    use paperbot_common::metadata::DisabledProvider;
    use sea_orm::ConnectionTrait;

    /// Source "dup" repeats the DOI served by "a"
    struct StaticFetcher;

    #[async_trait]
    impl SourceFetcher for StaticFetcher {
        async fn fetch(&self, source: &FeedSource) -> std::result::Result<Vec<CandidateRecord>, FeedError> {
            match source.name.as_str() {
                "down" => Err(FeedError::Status {
                    status: 503,
                    url: source.url.clone(),
                }),
                "dup" => Ok(vec![CandidateRecord {
                    title: "Shared".into(),
                    link: "https://mirror.example.org/shared".into(),
                    doi: Some("10.1000/shared".into()),
                    journal: source.name.clone(),
                    ..Default::default()
                }]),
                _ => Ok(vec![
                    CandidateRecord {
                        title: "Shared".into(),
                        link: "https://a.example.org/shared".into(),
                        doi: Some("10.1000/shared".into()),
                        journal: source.name.clone(),
                        ..Default::default()
                    },
                    CandidateRecord {
                        title: "Only in a".into(),
                        link: "https://a.example.org/only".into(),
                        journal: source.name.clone(),
                        ..Default::default()
                    },
                ]),
            }
        }
    }

    async fn pipeline(names: &[&str]) -> IngestionPipeline {
        pipeline_over(DbPool::in_memory().await.unwrap(), names)
    }

    fn pipeline_over(pool: DbPool, names: &[&str]) -> IngestionPipeline {
        let repository = Repository::new(pool);
        let orchestrator = Arc::new(FetchOrchestrator::new(
            Arc::new(StaticFetcher),
            Arc::new(DisabledProvider),
            1,
        ));
        let sources = names
            .iter()
            .map(|n| FeedSource::new(*n, format!("https://{}.example.org/rss", n)))
            .collect();
        IngestionPipeline::new(repository, orchestrator, sources, 2)
    }

    #[tokio::test]
    async fn test_cycle_dedups_across_sources() {
        let pipeline = pipeline(&["a", "dup", "down"]).await;

        let summary = pipeline.run_cycle().await.unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.new, 2);
        assert_eq!(summary.archived, 0);
        assert_eq!(summary.source_errors.len(), 1);

        let status = pipeline.fetch_state().status();
        assert!(status.complete);
        assert!(!status.running);
        assert_eq!(status.message, "Done: 2 new, 3 processed");
    }

    #[tokio::test]
    async fn test_second_cycle_archives_first() {
        let pipeline = pipeline(&["a"]).await;
        pipeline.run_cycle().await.unwrap();

        let summary = pipeline.run_cycle().await.unwrap();
        assert_eq!(summary.archived, 2);
        assert_eq!(summary.new, 0);
        assert_eq!(summary.message(), "Done: 0 new, 2 processed (2 archived)");
    }

    #[tokio::test]
    async fn test_cycle_in_progress_is_rejected() {
        let pipeline = pipeline(&["a"]).await;
        let _held = pipeline.fetch_state().try_begin("busy").unwrap();

        let err = pipeline.run_cycle().await.unwrap_err();
        assert!(matches!(err, IngestionError::CycleInProgress));
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_cycle() {
        let pool = DbPool::in_memory().await.unwrap();
        pool.connection()
            .execute_unprepared("DROP TABLE papers")
            .await
            .unwrap();
        let pipeline = pipeline_over(pool, &["a"]);

        let err = pipeline.run_cycle().await.unwrap_err();
        assert!(matches!(err, IngestionError::Storage(_)));

        let status = pipeline.fetch_state().status();
        assert!(!status.running);
        assert!(status.message.starts_with("Error:"), "{}", status.message);

        // The slot is free again
        assert!(pipeline.fetch_state().try_begin("retry").is_some());
    }
}
