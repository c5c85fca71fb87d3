//! Configuration management for PaperBot
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with PAPERBOT__)
//! - Configuration files (config/default, config/{env}, config/local)
//! - Default values

use crate::feeds::FeedSource;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Paper store
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Feed source list
    #[serde(default)]
    pub feeds: FeedsConfig,

    /// Fetch cycle tuning
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Metadata service (OpenAlex)
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Export destination
    #[serde(default)]
    pub export: ExportConfig,

    /// HTTP gateway
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Log every SQL statement
    #[serde(default)]
    pub sqlx_logging: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedsConfig {
    /// JSON file holding `[{"name": ..., "url": ...}]`
    #[serde(default = "default_feeds_path")]
    pub path: PathBuf,

    /// Sources declared inline in the config file
    #[serde(default)]
    pub sources: Vec<FeedSource>,

    /// Per-request timeout for feed downloads
    #[serde(default = "default_feed_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Concurrent source fetches (None = derived from available cores)
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// Enrich candidates with a DOI through the metadata service
    #[serde(default = "default_true")]
    pub enrich: bool,

    /// Concurrent metadata lookups
    #[serde(default = "default_enrich_concurrency")]
    pub enrich_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetadataConfig {
    /// API base URL
    #[serde(default = "default_metadata_base_url")]
    pub base_url: String,

    /// Contact address sent with every request
    #[serde(default)]
    pub contact_email: String,

    /// Request timeout in seconds
    #[serde(default = "default_metadata_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    /// Base directory for exports
    #[serde(default = "default_export_root")]
    pub root: PathBuf,

    /// Subdirectory used for picked exports
    #[serde(default = "default_export_subdir")]
    pub subdir: String,

    /// Prefix for BibTeX citation keys
    #[serde(default = "default_citation_prefix")]
    pub citation_prefix: String,

    /// Default format: md, tex or csv
    #[serde(default = "default_export_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Clear every pick when the gateway shuts down
    #[serde(default = "default_true")]
    pub reset_picks_on_shutdown: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logging: bool,
}

// Default value functions
fn default_database_url() -> String { "sqlite://paperbot.db?mode=rwc".to_string() }
fn default_max_connections() -> u32 { 5 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10 }
fn default_feeds_path() -> PathBuf { PathBuf::from("feeds.json") }
fn default_feed_timeout() -> u64 { 30 }
fn default_true() -> bool { true }
fn default_enrich_concurrency() -> usize { 4 }
fn default_metadata_base_url() -> String { "https://api.openalex.org".to_string() }
fn default_metadata_timeout() -> u64 { 10 }
fn default_export_root() -> PathBuf { PathBuf::from("exports") }
fn default_export_subdir() -> String { "picked".to_string() }
fn default_citation_prefix() -> String { "paperbot".to_string() }
fn default_export_format() -> String { "md".to_string() }
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8000 }
fn default_log_level() -> String { "info".to_string() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            sqlx_logging: false,
        }
    }
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            path: default_feeds_path(),
            sources: Vec::new(),
            request_timeout_secs: default_feed_timeout(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            enrich: true,
            enrich_concurrency: default_enrich_concurrency(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: default_metadata_base_url(),
            contact_email: String::new(),
            timeout_secs: default_metadata_timeout(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            root: default_export_root(),
            subdir: default_export_subdir(),
            citation_prefix: default_citation_prefix(),
            format: default_export_format(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            reset_picks_on_shutdown: true,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("PAPERBOT_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., PAPERBOT__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("PAPERBOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific config file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("PAPERBOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Inline sources followed by the feeds file, deduplicated by URL
    pub fn feed_sources(&self) -> crate::Result<Vec<FeedSource>> {
        let mut sources = self.feeds.sources.clone();
        sources.extend(load_feed_file(&self.feeds.path)?);

        let mut seen = HashSet::new();
        sources.retain(|source| seen.insert(source.url.clone()));
        Ok(sources)
    }

    /// Timeout applied to each feed download
    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feeds.request_timeout_secs)
    }
}

/// Read a feeds file; a missing file means no sources
pub fn load_feed_file(path: &Path) -> crate::Result<Vec<FeedSource>> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Feeds file not found, skipping");
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path).map_err(|e| crate::AppError::Configuration {
        message: format!("Failed to read {}: {}", path.display(), e),
    })?;

    serde_json::from_str(&raw).map_err(|e| crate::AppError::Configuration {
        message: format!("Invalid feeds file {}: {}", path.display(), e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.metadata.base_url, "https://api.openalex.org");
        assert_eq!(config.metadata.timeout_secs, 10);
        assert!(config.fetch.max_workers.is_none());
        assert_eq!(config.export.citation_prefix, "paperbot");
    }

    #[test]
    fn test_missing_feeds_file_is_empty() {
        let sources = load_feed_file(Path::new("/nonexistent/feeds.json")).unwrap();
        assert!(sources.is_empty());
    }

    #[test]
    fn test_feed_sources_merge_and_dedup() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"name": "Nature", "url": "https://www.nature.com/nature.rss"}},
                {{"name": "Science", "url": "https://www.science.org/rss/news_current.xml"}}
            ]"#
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.feeds.path = file.path().to_path_buf();
        config.feeds.sources = vec![FeedSource::new("Nature", "https://www.nature.com/nature.rss")];

        let sources = config.feed_sources().unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].name, "Nature");
        assert_eq!(sources[1].name, "Science");
    }

    #[test]
    fn test_invalid_feeds_file_is_configuration_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = load_feed_file(file.path()).unwrap_err();
        assert!(matches!(err, crate::AppError::Configuration { .. }));
    }
}
