//! Concurrent multi-source fetch
//!
//! Every source is downloaded in its own spawned task, at most `max_workers`
//! at a time, and the entries are merged into one stream in arrival order.
//! A failing source only loses its own entries.

use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use paperbot_common::errors::AppError;
use paperbot_common::feeds::{CandidateRecord, FeedSource, SourceFetcher};
use paperbot_common::metadata::{MetadataError, MetadataProvider, NormalizedMetadata, UNAVAILABLE};
use paperbot_common::metrics;
use serde::Serialize;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Instant;
use tracing::{debug, error, warn};

/// Upper bound for the derived worker count
const MAX_DEFAULT_WORKERS: usize = 8;

/// `available_parallelism - 1`, kept within `1..=8`
pub fn default_worker_count() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores.saturating_sub(1).clamp(1, MAX_DEFAULT_WORKERS)
}

/// Snapshot of the fetch status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchStatus {
    pub running: bool,
    pub message: String,
    pub complete: bool,
}

/// Shared fetch status cell; at most one cycle holds a ticket
#[derive(Debug, Clone, Default)]
pub struct FetchState {
    inner: Arc<Mutex<FetchStatus>>,
}

impl FetchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the cycle slot, or `None` while another cycle runs
    pub fn try_begin(&self, message: impl Into<String>) -> Option<CycleTicket> {
        let mut status = self.lock();
        if status.running {
            return None;
        }

        *status = FetchStatus {
            running: true,
            message: message.into(),
            complete: false,
        };
        metrics::set_fetch_running(true);

        Some(CycleTicket {
            state: self.clone(),
            finished: false,
        })
    }

    pub fn status(&self) -> FetchStatus {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, FetchStatus> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of a running cycle; the slot frees when it is finished or dropped
#[derive(Debug)]
pub struct CycleTicket {
    state: FetchState,
    finished: bool,
}

impl CycleTicket {
    /// Replace the progress message
    pub fn update(&self, message: impl Into<String>) {
        self.state.lock().message = message.into();
    }

    /// Mark the cycle complete with a final message
    pub fn finish(mut self, message: impl Into<String>) {
        *self.state.lock() = FetchStatus {
            running: false,
            message: message.into(),
            complete: true,
        };
        self.finished = true;
        metrics::set_fetch_running(false);
    }
}

impl Drop for CycleTicket {
    fn drop(&mut self) {
        if !self.finished {
            let mut status = self.state.lock();
            status.running = false;
            status.complete = false;
            status.message = "Fetch interrupted".to_string();
            metrics::set_fetch_running(false);
        }
    }
}

/// One fetch run: a stream of candidates plus the failures seen so far
pub struct FetchRun {
    records: BoxStream<'static, CandidateRecord>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl FetchRun {
    /// Source failures as `"{source}: {error}"`, in the order they surfaced
    pub fn errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Stream for FetchRun {
    type Item = CandidateRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.records.poll_next_unpin(cx)
    }
}

/// Bounded-concurrency fetch over many sources
pub struct FetchOrchestrator {
    fetcher: Arc<dyn SourceFetcher>,
    provider: Arc<dyn MetadataProvider>,
    enrich_concurrency: usize,
    generation: Arc<AtomicU64>,
    state: FetchState,
}

impl FetchOrchestrator {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        provider: Arc<dyn MetadataProvider>,
        enrich_concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            provider,
            enrich_concurrency: enrich_concurrency.max(1),
            generation: Arc::new(AtomicU64::new(0)),
            state: FetchState::new(),
        }
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    /// Supersede every run started so far.
    ///
    /// Their in-flight downloads finish in the background and are dropped.
    pub fn cancel(&self) {
        let previous = self.generation.fetch_add(1, Ordering::SeqCst);
        debug!(generation = previous + 1, "Fetch runs cancelled");
    }

    /// Start a fresh concurrent run over `sources`
    pub fn fetch_all(&self, sources: Vec<FeedSource>, max_workers: usize) -> FetchRun {
        let workers = max_workers.max(1);
        let generation = self.generation.load(Ordering::SeqCst);
        let current = self.generation.clone();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let failures = errors.clone();
        let fetcher = self.fetcher.clone();

        let fetched = stream::iter(sources)
            .map(move |source| {
                let fetcher = fetcher.clone();
                tokio::spawn(async move {
                    let started = Instant::now();
                    let result = fetcher.fetch(&source).await;
                    metrics::record_source_fetch(started.elapsed().as_secs_f64(), result.is_ok());
                    (source, result)
                })
            })
            .buffer_unordered(workers)
            .flat_map(move |joined| {
                let records = match joined {
                    Ok((source, Ok(records))) => {
                        debug!(source = %source.name, entries = records.len(), "Source fetched");
                        records
                    }
                    Ok((source, Err(e))) => {
                        let err = AppError::from(e);
                        if err.is_skippable() {
                            warn!(source = %source.name, url = %source.url, error = %err, "Source fetch failed, skipping");
                        } else {
                            error!(source = %source.name, url = %source.url, error = %err, "Source fetch failed unexpectedly, skipping");
                        }
                        push_error(&failures, format!("{}: {}", source.name, err));
                        Vec::new()
                    }
                    Err(e) => {
                        warn!(error = %e, "Source task aborted");
                        push_error(&failures, format!("task: {}", e));
                        Vec::new()
                    }
                };
                stream::iter(records)
            })
            .take_while(move |_: &CandidateRecord| {
                future::ready(current.load(Ordering::SeqCst) == generation)
            });

        let provider = self.provider.clone();
        let records = fetched
            .map(move |record| {
                let provider = provider.clone();
                async move { enrich(provider.as_ref(), record).await }
            })
            .buffered(self.enrich_concurrency)
            .boxed();

        FetchRun { records, errors }
    }
}

fn push_error(errors: &Mutex<Vec<String>>, message: String) {
    errors
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(message);
}

/// Fill a candidate from the metadata service; failures keep the feed fields
async fn enrich(provider: &dyn MetadataProvider, mut record: CandidateRecord) -> CandidateRecord {
    let Some(doi) = record.doi.clone() else {
        return record;
    };

    match provider.fetch(&doi).await {
        Ok(meta) => {
            metrics::record_metadata(true);
            apply_metadata(&mut record, meta);
        }
        Err(MetadataError::Disabled) => {}
        Err(e) => {
            metrics::record_metadata(false);
            warn!(doi = %doi, provider = provider.name(), error = %e, "Metadata lookup failed, keeping feed fields");
        }
    }
    record
}

fn apply_metadata(record: &mut CandidateRecord, meta: NormalizedMetadata) {
    if !meta.authors.is_empty() {
        record.authors = meta.authors.join(", ");
    }
    if record.journal.trim().is_empty() && meta.venue != UNAVAILABLE {
        record.journal = meta.venue;
    }
    if meta.abstract_text != UNAVAILABLE {
        record.abstract_text = Some(meta.abstract_text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use paperbot_common::feeds::FeedError;
    use paperbot_common::metadata::DisabledProvider;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Serves three entries per source, fails sources named "broken*"
    #[derive(Default)]
    struct FakeFetcher {
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SourceFetcher for FakeFetcher {
        async fn fetch(&self, source: &FeedSource) -> Result<Vec<CandidateRecord>, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if source.name.starts_with("broken") {
                return Err(FeedError::Parse("unexpected end of document".into()));
            }
            Ok((0..3)
                .map(|n| CandidateRecord {
                    title: format!("{} #{}", source.name, n),
                    link: format!("{}/{}", source.url, n),
                    journal: source.name.clone(),
                    doi: Some(format!("10.1000/{}.{}", source.name, n)),
                    ..Default::default()
                })
                .collect())
        }
    }

    struct FakeProvider;

    #[async_trait]
    impl MetadataProvider for FakeProvider {
        async fn fetch(&self, doi: &str) -> Result<NormalizedMetadata, MetadataError> {
            if doi.ends_with(".2") {
                return Err(MetadataError::Parse("bad body".into()));
            }
            Ok(NormalizedMetadata {
                authors: vec!["Ada Lovelace".into(), "Alan Turing".into()],
                venue: "Elsewhere".into(),
                abstract_text: format!("abstract of {}", doi),
            })
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn sources(names: &[&str]) -> Vec<FeedSource> {
        names
            .iter()
            .map(|name| FeedSource::new(*name, format!("https://feeds.example.org/{}", name)))
            .collect()
    }

    fn orchestrator(fetcher: Arc<FakeFetcher>) -> FetchOrchestrator {
        FetchOrchestrator::new(fetcher, Arc::new(DisabledProvider), 2)
    }

    #[tokio::test]
    async fn test_bounded_concurrency_and_union() {
        let fetcher = Arc::new(FakeFetcher::default());
        let orchestrator = orchestrator(fetcher.clone());

        let mut run = orchestrator.fetch_all(sources(&["a", "b", "c", "d", "e"]), 2);
        let mut links = Vec::new();
        while let Some(record) = run.next().await {
            links.push(record.link);
        }

        assert_eq!(links.len(), 15);
        let unique: HashSet<_> = links.iter().cloned().collect();
        assert_eq!(unique.len(), 15);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 2);
        assert!(run.errors().is_empty());
    }

    #[tokio::test]
    async fn test_failing_source_is_isolated() {
        let fetcher = Arc::new(FakeFetcher::default());
        let orchestrator = orchestrator(fetcher.clone());

        let mut run = orchestrator.fetch_all(sources(&["a", "broken", "c"]), 3);
        let mut records = Vec::new();
        while let Some(record) = run.next().await {
            records.push(record);
        }

        assert_eq!(records.len(), 6);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        let errors = run.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("broken: "));
    }

    #[tokio::test]
    async fn test_order_within_source_is_kept() {
        let orchestrator = orchestrator(Arc::new(FakeFetcher::default()));

        let records: Vec<CandidateRecord> = orchestrator
            .fetch_all(sources(&["x", "y"]), 2)
            .collect()
            .await;

        for name in ["x", "y"] {
            let titles: Vec<&str> = records
                .iter()
                .filter(|r| r.journal == name)
                .map(|r| r.title.as_str())
                .collect();
            assert_eq!(titles, [format!("{} #0", name), format!("{} #1", name), format!("{} #2", name)]);
        }
    }

    #[tokio::test]
    async fn test_zero_workers_is_clamped() {
        let orchestrator = orchestrator(Arc::new(FakeFetcher::default()));
        let records: Vec<_> = orchestrator.fetch_all(sources(&["a"]), 0).collect().await;
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_cancel_discards_superseded_run() {
        let orchestrator = orchestrator(Arc::new(FakeFetcher::default()));

        let run = orchestrator.fetch_all(sources(&["a", "b"]), 2);
        orchestrator.cancel();
        let records: Vec<_> = run.collect().await;
        assert!(records.is_empty());

        // A run started after cancellation is unaffected
        let records: Vec<_> = orchestrator.fetch_all(sources(&["a"]), 1).collect().await;
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_enrichment_fills_fields_and_tolerates_failures() {
        let orchestrator =
            FetchOrchestrator::new(Arc::new(FakeFetcher::default()), Arc::new(FakeProvider), 2);

        let records: Vec<_> = orchestrator.fetch_all(sources(&["j"]), 1).collect().await;
        assert_eq!(records.len(), 3);

        let enriched = &records[0];
        assert_eq!(enriched.authors, "Ada Lovelace, Alan Turing");
        assert_eq!(enriched.journal, "j");
        assert_eq!(enriched.abstract_text.as_deref(), Some("abstract of 10.1000/j.0"));

        let failed = &records[2];
        assert!(failed.authors.is_empty());
        assert!(failed.abstract_text.is_none());
    }

    #[test]
    fn test_fetch_state_single_ticket() {
        let state = FetchState::new();
        let ticket = state.try_begin("Fetching feeds...").unwrap();
        assert!(state.status().running);
        assert!(state.try_begin("again").is_none());

        ticket.finish("Done: 1 new, 2 processed");
        let status = state.status();
        assert!(!status.running);
        assert!(status.complete);
        assert_eq!(status.message, "Done: 1 new, 2 processed");
        assert!(state.try_begin("next").is_some());
    }

    #[test]
    fn test_dropped_ticket_frees_slot() {
        let state = FetchState::new();
        {
            let _ticket = state.try_begin("Fetching feeds...").unwrap();
        }
        let status = state.status();
        assert!(!status.running);
        assert!(!status.complete);
        assert!(state.try_begin("retry").is_some());
    }

    #[test]
    fn test_default_worker_count_bounds() {
        let workers = default_worker_count();
        assert!((1..=MAX_DEFAULT_WORKERS).contains(&workers));
    }
}
