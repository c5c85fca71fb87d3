//! Fetch, pick and export actions

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use paperbot_common::errors::{AppError, Result};
use paperbot_common::export::ExportFormat;
use paperbot_ingestion::pipeline::STARTING_MESSAGE;
use paperbot_ingestion::{ExportOutcome, FetchStatus};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::AppState;

/// Start a background fetch cycle.
///
/// 202 with the fresh status when a cycle was started, 200 with the running
/// cycle's status otherwise.
pub async fn start_fetch(State(state): State<AppState>) -> (StatusCode, Json<FetchStatus>) {
    let fetch_state = state.pipeline.fetch_state().clone();

    let Some(ticket) = fetch_state.try_begin(STARTING_MESSAGE) else {
        info!("Fetch requested while a cycle is running");
        return (StatusCode::OK, Json(fetch_state.status()));
    };

    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        // Outcome lands in the fetch status; errors are already logged
        if let Err(e) = pipeline.run_with_ticket(ticket).await {
            warn!(error = %e, "Background fetch cycle ended with an error");
        }
    });

    (StatusCode::ACCEPTED, Json(fetch_state.status()))
}

pub async fn fetch_status(State(state): State<AppState>) -> Json<FetchStatus> {
    Json(state.pipeline.fetch_state().status())
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    /// md, tex or csv (defaults to export.format)
    pub format: Option<String>,
    pub subdir: Option<String>,
}

#[derive(Serialize)]
pub struct ExportResponse {
    pub exported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ExportOutcome>,
}

/// Export every picked paper
pub async fn export_picked(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Json<ExportResponse>> {
    let raw = query
        .format
        .as_deref()
        .unwrap_or(&state.config.export.format);
    let format: ExportFormat = raw
        .parse()
        .map_err(|message| AppError::InvalidFormat { message })?;
    let subdir = query
        .subdir
        .as_deref()
        .unwrap_or(&state.config.export.subdir);

    let outcome = state.curation.export_picked(subdir, format).await?;
    Ok(Json(ExportResponse {
        exported: outcome.is_some(),
        outcome,
    }))
}

#[derive(Serialize)]
pub struct ToggleResponse {
    pub id: i32,
    pub is_picked: bool,
}

/// Flip one paper's pick
pub async fn toggle_pick(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ToggleResponse>> {
    let is_picked = state
        .curation
        .toggle_pick(id)
        .await?
        .ok_or(AppError::PaperNotFound { id })?;
    Ok(Json(ToggleResponse { id, is_picked }))
}

#[derive(Debug, Deserialize)]
pub struct IdsRequest {
    pub ids: Vec<i32>,
}

#[derive(Serialize)]
pub struct BulkResponse {
    pub updated: u64,
}

pub async fn pick_all(
    State(state): State<AppState>,
    Json(request): Json<IdsRequest>,
) -> Result<Json<BulkResponse>> {
    let updated = state.curation.pick(&request.ids).await?;
    Ok(Json(BulkResponse { updated }))
}

pub async fn unpick_all(
    State(state): State<AppState>,
    Json(request): Json<IdsRequest>,
) -> Result<Json<BulkResponse>> {
    let updated = state.curation.unpick(&request.ids).await?;
    Ok(Json(BulkResponse { updated }))
}
