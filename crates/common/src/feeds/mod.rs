//! Journal feed retrieval
//!
//! Downloads a configured feed and turns its entries into [`CandidateRecord`]s.

mod models;
mod parser;

pub use models::{normalize_doi, CandidateRecord, FeedSource};
pub use parser::parse_feed;

use crate::errors::AppError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} when fetching {url}")]
    Status { status: u16, url: String },

    #[error("Feed parse error: {0}")]
    Parse(String),
}

impl From<FeedError> for AppError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Request(e) => AppError::HttpClient(e),
            FeedError::Parse(message) => AppError::Parse { message },
            other => AppError::Network {
                message: other.to_string(),
            },
        }
    }
}

/// Fetches one source and returns its parsed entries
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<CandidateRecord>, FeedError>;
}

/// Feed fetcher over HTTP
#[derive(Clone)]
pub struct HttpFeedFetcher {
    client: Client,
}

impl HttpFeedFetcher {
    /// Create a fetcher whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("paperbot/{}", crate::VERSION))
            .build()?;
        Ok(Self { client })
    }

    /// Create a fetcher with a custom reqwest Client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceFetcher for HttpFeedFetcher {
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<CandidateRecord>, FeedError> {
        tracing::debug!(source = %source.name, url = %source.url, "Fetching feed");

        let response = self.client.get(&source.url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
                url: source.url.clone(),
            });
        }

        let bytes = response.bytes().await?;
        let records = parse_feed(&bytes, &source.name)?;

        tracing::debug!(source = %source.name, entries = records.len(), "Parsed feed");
        Ok(records)
    }
}
