//! PaperBot API Gateway
//!
//! JSON API over the paper store:
//! - Paper lists and lookups
//! - Background fetch cycles and their status
//! - Pick/unpick and export of picked papers
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use paperbot_common::{
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, Repository},
    export::Exporter,
    metrics,
};
use paperbot_ingestion::{CurationService, IngestionPipeline, SelectionGuard};
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repository: Repository,
    pub pipeline: IngestionPipeline,
    pub curation: CurationService,
    pub metrics: Option<PrometheusHandle>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.observability);

    info!("Starting PaperBot API Gateway v{}", paperbot_common::VERSION);
    let config = Arc::new(config);

    // Initialize metrics
    let prometheus = install_metrics();
    metrics::register_metrics();

    info!(url = %config.database.url, "Opening paper store...");
    let repository = Repository::new(DbPool::new(&config.database).await?);

    let pipeline = IngestionPipeline::from_config(&config, repository.clone(), true, None)?;
    let curation = CurationService::new(repository.clone(), Exporter::from_config(&config.export));
    let guard = config
        .server
        .reset_picks_on_shutdown
        .then(|| SelectionGuard::new(repository.clone()));

    let state = AppState {
        config: config.clone(),
        repository,
        pipeline: pipeline.clone(),
        curation,
        metrics: prometheus,
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // A running cycle keeps its ticket; its remaining downloads are discarded
    pipeline.orchestrator().cancel();
    if let Some(guard) = guard {
        guard.release().await;
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Install the Prometheus recorder; `/metrics` answers 404 without it
fn install_metrics() -> Option<PrometheusHandle> {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(metrics::metric_name("request_duration_seconds")),
            metrics::LATENCY_BUCKETS,
        )
        .and_then(|builder| {
            builder.set_buckets_for_metric(
                Matcher::Suffix("fetch_duration_seconds".to_string()),
                metrics::FETCH_BUCKETS,
            )
        })
        .and_then(|builder| {
            builder.set_buckets_for_metric(
                Matcher::Full(metrics::metric_name("cycle_duration_seconds")),
                metrics::FETCH_BUCKETS,
            )
        });

    match builder.and_then(|builder| builder.install_recorder()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics))

        // Aggregates
        .route("/stats", get(handlers::stats::stats))
        .route("/journals", get(handlers::stats::journals))

        // Paper lists
        .route("/papers/new", get(handlers::papers::list_new))
        .route("/papers/picked", get(handlers::papers::list_picked))
        .route("/papers/archive", get(handlers::papers::list_archive))
        .route("/papers/{id}", get(handlers::papers::get_paper))

        // Actions
        .route("/actions/fetch", post(handlers::actions::start_fetch))
        .route("/actions/fetch-status", get(handlers::actions::fetch_status))
        .route("/actions/export", post(handlers::actions::export_picked))
        .route("/actions/pick/{id}", post(handlers::actions::toggle_pick))
        .route("/actions/pick-all", post(handlers::actions::pick_all))
        .route("/actions/unpick-all", post(handlers::actions::unpick_all))

        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
