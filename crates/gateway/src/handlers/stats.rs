//! Aggregate handlers

use axum::{extract::State, Json};
use paperbot_common::{db::StatusCounts, errors::Result};

use crate::AppState;

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatusCounts>> {
    Ok(Json(state.repository.status_counts().await?))
}

/// Journal labels for filter choices
pub async fn journals(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.repository.distinct_venues().await?))
}
