//! Paper list handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use paperbot_common::{
    db::models::{Paper, PaperStatus},
    db::SortKey,
    errors::{AppError, Result},
};
use paperbot_ingestion::curation::{filter_by_query, QueryField};
use serde::{Deserialize, Serialize};

use crate::AppState;

const NEW_LIMIT: u64 = 200;
const PICKED_LIMIT: u64 = 100;
const ARCHIVE_LIMIT: u64 = 500;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Text filter over title, journal and authors
    pub q: Option<String>,
    pub journal: Option<String>,
}

#[derive(Serialize)]
pub struct PaperList {
    pub count: usize,
    pub papers: Vec<Paper>,
}

impl PaperList {
    fn filtered(papers: Vec<Paper>, query: Option<&str>) -> Self {
        let papers = match query {
            Some(q) => filter_by_query(papers, q, &QueryField::ALL),
            None => papers,
        };
        Self {
            count: papers.len(),
            papers,
        }
    }
}

/// New papers in insertion order
pub async fn list_new(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PaperList>> {
    let papers = state
        .repository
        .find_by_status(PaperStatus::New, NEW_LIMIT, SortKey::Insertion, query.journal.as_deref())
        .await?;
    Ok(Json(PaperList::filtered(papers, query.q.as_deref())))
}

/// Picked papers
pub async fn list_picked(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PaperList>> {
    let papers = state.repository.find_picked(PICKED_LIMIT).await?;
    Ok(Json(PaperList::filtered(papers, query.q.as_deref())))
}

/// Every paper, newest publication first
pub async fn list_archive(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PaperList>> {
    let papers = state
        .repository
        .find_all(ARCHIVE_LIMIT, SortKey::Date, query.journal.as_deref())
        .await?;
    Ok(Json(PaperList::filtered(papers, query.q.as_deref())))
}

/// Get a paper by ID
pub async fn get_paper(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Paper>> {
    state
        .repository
        .find_by_id(id)
        .await?
        .map(Json)
        .ok_or(AppError::PaperNotFound { id })
}
