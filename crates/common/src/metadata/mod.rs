//! Metadata enrichment
//!
//! Looks up a work by DOI and normalizes the bits the store keeps:
//! author names, venue and abstract.
//! - OpenAlex (`/works/https://doi.org/{doi}`)
//! - Disabled provider for runs without enrichment and for tests

pub mod decoder;

use crate::errors::AppError;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use decoder::{decode_inverted_index, decode_pairs, resolve_positions, UNAVAILABLE};

/// Normalized view of a work returned by the metadata service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMetadata {
    /// Author display names in authorship order
    pub authors: Vec<String>,
    /// Venue display name, or [`UNAVAILABLE`]
    pub venue: String,
    /// Reconstructed abstract, or [`UNAVAILABLE`]
    pub abstract_text: String,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata enrichment is disabled")]
    Disabled,

    #[error("metadata request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("metadata service returned HTTP {status} for {doi}")]
    Status { status: u16, doi: String },

    #[error("failed to parse metadata response: {0}")]
    Parse(String),
}

impl From<MetadataError> for AppError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::Request(e) => AppError::HttpClient(e),
            MetadataError::Parse(message) => AppError::Parse { message },
            other => AppError::Network {
                message: other.to_string(),
            },
        }
    }
}

/// Trait for DOI-keyed metadata lookup
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fetch and normalize metadata for one DOI
    async fn fetch(&self, doi: &str) -> Result<NormalizedMetadata, MetadataError>;

    /// Provider name for logs and metrics
    fn name(&self) -> &str;
}

/// OpenAlex works client
pub struct OpenAlexProvider {
    client: reqwest::Client,
    base_url: String,
    contact: String,
}

#[derive(Deserialize)]
struct WorkResponse {
    #[serde(default)]
    authorships: Vec<Authorship>,
    primary_location: Option<Location>,
    abstract_inverted_index: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Authorship {
    author: Option<AuthorRef>,
}

#[derive(Deserialize)]
struct AuthorRef {
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct Location {
    source: Option<SourceRef>,
}

#[derive(Deserialize)]
struct SourceRef {
    display_name: Option<String>,
}

impl OpenAlexProvider {
    /// Create a new OpenAlex client
    pub fn new(
        base_url: impl Into<String>,
        contact: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MetadataError> {
        let contact = contact.into();
        let user_agent = if contact.is_empty() {
            format!("paperbot/{}", crate::VERSION)
        } else {
            format!("paperbot/{} (mailto:{})", crate::VERSION, contact)
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            contact,
        })
    }

    fn work_url(&self, doi: &str) -> String {
        format!("{}/works/https://doi.org/{}", self.base_url, doi)
    }

    fn normalize(work: WorkResponse) -> NormalizedMetadata {
        let authors = work
            .authorships
            .into_iter()
            .filter_map(|a| a.author.and_then(|author| author.display_name))
            .filter(|name| !name.trim().is_empty())
            .collect();

        let venue = work
            .primary_location
            .and_then(|location| location.source)
            .and_then(|source| source.display_name)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| UNAVAILABLE.to_string());

        NormalizedMetadata {
            authors,
            venue,
            abstract_text: decode_inverted_index(work.abstract_inverted_index.as_ref()),
        }
    }
}

#[async_trait]
impl MetadataProvider for OpenAlexProvider {
    async fn fetch(&self, doi: &str) -> Result<NormalizedMetadata, MetadataError> {
        let mut request = self.client.get(self.work_url(doi));
        if !self.contact.is_empty() {
            request = request.query(&[("mailto", self.contact.as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(MetadataError::Status {
                status: status.as_u16(),
                doi: doi.to_string(),
            });
        }

        let body = response.text().await?;
        let work: WorkResponse =
            serde_json::from_str(&body).map_err(|e| MetadataError::Parse(e.to_string()))?;

        tracing::debug!(doi = %doi, "Metadata fetched");
        Ok(Self::normalize(work))
    }

    fn name(&self) -> &str {
        "openalex"
    }
}

/// Provider that never enriches
#[derive(Debug, Default)]
pub struct DisabledProvider;

#[async_trait]
impl MetadataProvider for DisabledProvider {
    async fn fetch(&self, _doi: &str) -> Result<NormalizedMetadata, MetadataError> {
        Err(MetadataError::Disabled)
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// Create a provider based on configuration
pub fn create_provider(
    enabled: bool,
    config: &crate::config::MetadataConfig,
) -> Result<Arc<dyn MetadataProvider>, MetadataError> {
    if !enabled {
        return Ok(Arc::new(DisabledProvider));
    }
    if config.contact_email.is_empty() {
        tracing::warn!("metadata.contact_email is empty; OpenAlex may throttle requests");
    }
    Ok(Arc::new(OpenAlexProvider::new(
        config.base_url.clone(),
        config.contact_email.clone(),
        Duration::from_secs(config.timeout_secs),
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn provider(base: String) -> OpenAlexProvider {
        OpenAlexProvider::new(base, "curator@example.org", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_normalizes_work() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(r"^/works/https:/+doi\.org/10\.1000/xyz$".into()))
            .match_query(Matcher::UrlEncoded("mailto".into(), "curator@example.org".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "authorships": [
                        {"author": {"display_name": "Ada Lovelace"}},
                        {"author": {"display_name": "Charles Babbage"}},
                        {"author": {}}
                    ],
                    "primary_location": {"source": {"display_name": "Nature"}},
                    "abstract_inverted_index": {"engines": [1], "analytical": [0]}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let meta = provider(server.url()).fetch("10.1000/xyz").await.unwrap();

        mock.assert_async().await;
        assert_eq!(meta.authors, vec!["Ada Lovelace", "Charles Babbage"]);
        assert_eq!(meta.venue, "Nature");
        assert_eq!(meta.abstract_text, "analytical engines");
    }

    #[tokio::test]
    async fn test_missing_fields_fall_back() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Any)
            .with_status(200)
            .with_body(json!({"primary_location": null}).to_string())
            .create_async()
            .await;

        let meta = provider(server.url()).fetch("10.1000/empty").await.unwrap();
        assert!(meta.authors.is_empty());
        assert_eq!(meta.venue, UNAVAILABLE);
        assert_eq!(meta.abstract_text, UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_not_found_is_status_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let err = provider(server.url()).fetch("10.1000/missing").await.unwrap_err();
        assert!(matches!(err, MetadataError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_invalid_json_is_parse_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Any)
            .with_status(200)
            .with_body("<html>rate limited</html>")
            .create_async()
            .await;

        let err = provider(server.url()).fetch("10.1000/bad").await.unwrap_err();
        assert!(matches!(err, MetadataError::Parse(_)));
        assert!(AppError::from(err).is_skippable());
    }

    #[tokio::test]
    async fn test_disabled_provider_always_fails() {
        let err = DisabledProvider.fetch("10.1000/xyz").await.unwrap_err();
        assert!(matches!(err, MetadataError::Disabled));
    }
}
