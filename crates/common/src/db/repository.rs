//! Repository for the paper store
//!
//! Owns identity-based deduplication, the status state machine and the
//! aggregate queries the curation surfaces need.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::Result;
use crate::feeds::CandidateRecord;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Result ordering for list queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Ascending id
    #[default]
    Insertion,
    /// Newest `published` first, ties by descending id
    Date,
}

impl SortKey {
    fn apply(self, query: Select<PaperEntity>) -> Select<PaperEntity> {
        match self {
            SortKey::Insertion => query.order_by_asc(PaperColumn::Id),
            SortKey::Date => query
                .order_by_desc(PaperColumn::Published)
                .order_by_desc(PaperColumn::Id),
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insertion" | "id" => Ok(SortKey::Insertion),
            "date" | "published" => Ok(SortKey::Date),
            other => Err(format!("unknown sort key: {}", other)),
        }
    }
}

/// Aggregate counts; `picked` overlaps the status buckets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub new: u64,
    pub picked: u64,
    pub archived: u64,
    pub total: u64,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.connection()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Insert a new paper or merge into the one sharing its identity.
    ///
    /// Returns `true` only when a row was inserted.
    pub async fn upsert(&self, candidate: &CandidateRecord) -> Result<bool> {
        match self.find_match(candidate).await? {
            None => {
                let paper = self.insert(candidate).await?;
                tracing::debug!(id = paper.id, identity = candidate.identity(), "Paper inserted");
                Ok(true)
            }
            Some(existing) => {
                tracing::debug!(id = existing.id, identity = candidate.identity(), "Merging into existing paper");
                self.merge(existing, candidate).await?;
                Ok(false)
            }
        }
    }

    async fn find_match(&self, candidate: &CandidateRecord) -> Result<Option<Paper>> {
        if let Some(doi) = non_empty(candidate.doi.as_deref()) {
            let by_doi = PaperEntity::find()
                .filter(PaperColumn::Doi.eq(doi))
                .one(self.conn())
                .await?;
            if by_doi.is_some() {
                return Ok(by_doi);
            }

            // A link-only record learns its DOI on the next sighting
            return PaperEntity::find()
                .filter(PaperColumn::Link.eq(candidate.link.as_str()))
                .filter(PaperColumn::Doi.is_null())
                .order_by_asc(PaperColumn::Id)
                .one(self.conn())
                .await
                .map_err(Into::into);
        }

        PaperEntity::find()
            .filter(PaperColumn::Link.eq(candidate.link.as_str()))
            .order_by_asc(PaperColumn::Id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    async fn insert(&self, candidate: &CandidateRecord) -> Result<Paper> {
        let paper = PaperActiveModel {
            title: Set(candidate.title.clone()),
            authors: Set(candidate.authors.clone()),
            journal: Set(candidate.journal.clone()),
            published: Set(non_empty(candidate.published.as_deref()).map(str::to_string)),
            doi: Set(non_empty(candidate.doi.as_deref()).map(str::to_string)),
            link: Set(candidate.link.clone()),
            abstract_text: Set(non_empty(candidate.abstract_text.as_deref()).map(str::to_string)),
            status: Set(PaperStatus::New.into()),
            is_picked: Set(false),
            created_at: Set(Utc::now()),
            exported_at: Set(None),
            ..Default::default()
        };

        paper.insert(self.conn()).await.map_err(Into::into)
    }

    async fn merge(&self, existing: Paper, candidate: &CandidateRecord) -> Result<()> {
        let resurfaced = existing.paper_status() == PaperStatus::Archived
            && is_newer(candidate.published.as_deref(), existing.published.as_deref());

        let mut paper: PaperActiveModel = existing.clone().into();

        if let Some(title) = non_empty(Some(candidate.title.as_str())) {
            if title != existing.title {
                paper.title = Set(title.to_string());
            }
        }
        if let Some(authors) = non_empty(Some(candidate.authors.as_str())) {
            if authors != existing.authors {
                paper.authors = Set(authors.to_string());
            }
        }
        if let Some(journal) = non_empty(Some(candidate.journal.as_str())) {
            if journal != existing.journal {
                paper.journal = Set(journal.to_string());
            }
        }
        if let Some(link) = non_empty(Some(candidate.link.as_str())) {
            if link != existing.link {
                paper.link = Set(link.to_string());
            }
        }
        if let Some(published) = non_empty(candidate.published.as_deref()) {
            if existing.published.as_deref() != Some(published) {
                paper.published = Set(Some(published.to_string()));
            }
        }
        if let Some(text) = non_empty(candidate.abstract_text.as_deref()) {
            if existing.abstract_text.as_deref() != Some(text) {
                paper.abstract_text = Set(Some(text.to_string()));
            }
        }
        if existing.doi.is_none() {
            if let Some(doi) = non_empty(candidate.doi.as_deref()) {
                paper.doi = Set(Some(doi.to_string()));
            }
        }
        if resurfaced {
            paper.status = Set(PaperStatus::New.into());
            tracing::debug!(id = existing.id, "Archived paper resurfaced");
        }

        if paper.is_changed() {
            paper.update(self.conn()).await?;
        }
        Ok(())
    }

    /// Archive every `new` paper created up to now; returns the count
    pub async fn archive_old_new(&self) -> Result<u64> {
        let result = PaperEntity::update_many()
            .col_expr(PaperColumn::Status, Expr::value(PaperStatus::Archived.as_str()))
            .filter(PaperColumn::Status.eq(PaperStatus::New.as_str()))
            .filter(PaperColumn::CreatedAt.lte(Utc::now()))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Papers with the given stored status, optionally limited to one venue
    pub async fn find_by_status(
        &self,
        status: PaperStatus,
        limit: u64,
        sort: SortKey,
        venue: Option<&str>,
    ) -> Result<Vec<Paper>> {
        let query = PaperEntity::find().filter(PaperColumn::Status.eq(status.as_str()));

        sort.apply(with_venue(query, venue))
            .limit(limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Picked papers in insertion order
    pub async fn find_picked(&self, limit: u64) -> Result<Vec<Paper>> {
        PaperEntity::find()
            .filter(PaperColumn::IsPicked.eq(true))
            .order_by_asc(PaperColumn::Id)
            .limit(limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Papers of every status
    pub async fn find_all(
        &self,
        limit: u64,
        sort: SortKey,
        venue: Option<&str>,
    ) -> Result<Vec<Paper>> {
        sort.apply(with_venue(PaperEntity::find(), venue))
            .limit(limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find paper by ID
    pub async fn find_by_id(&self, id: i32) -> Result<Option<Paper>> {
        PaperEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Curation
    // ========================================================================

    /// Set `is_picked`; unknown ids are ignored
    pub async fn pick(&self, ids: &[i32]) -> Result<u64> {
        self.set_picked(ids, true).await
    }

    /// Clear `is_picked`; unknown ids are ignored
    pub async fn unpick(&self, ids: &[i32]) -> Result<u64> {
        self.set_picked(ids, false).await
    }

    async fn set_picked(&self, ids: &[i32], picked: bool) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = PaperEntity::update_many()
            .col_expr(PaperColumn::IsPicked, Expr::value(picked))
            .filter(PaperColumn::Id.is_in(ids.iter().copied()))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected)
    }

    /// Stamp `exported_at = now`, never moving an existing stamp backwards
    pub async fn mark_exported(&self, ids: &[i32]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let result = PaperEntity::update_many()
            .col_expr(PaperColumn::ExportedAt, Expr::value(now))
            .filter(PaperColumn::Id.is_in(ids.iter().copied()))
            .filter(
                Condition::any()
                    .add(PaperColumn::ExportedAt.is_null())
                    .add(PaperColumn::ExportedAt.lte(now)),
            )
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected)
    }

    /// Clear every pick; returns the number of papers that were picked
    pub async fn reset_all_picked(&self) -> Result<u64> {
        let result = PaperEntity::update_many()
            .col_expr(PaperColumn::IsPicked, Expr::value(false))
            .filter(PaperColumn::IsPicked.eq(true))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected)
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let new = PaperEntity::find()
            .filter(PaperColumn::Status.eq(PaperStatus::New.as_str()))
            .count(self.conn())
            .await?;
        let archived = PaperEntity::find()
            .filter(PaperColumn::Status.eq(PaperStatus::Archived.as_str()))
            .count(self.conn())
            .await?;
        let picked = PaperEntity::find()
            .filter(PaperColumn::IsPicked.eq(true))
            .count(self.conn())
            .await?;
        let total = PaperEntity::find().count(self.conn()).await?;

        Ok(StatusCounts {
            new,
            picked,
            archived,
            total,
        })
    }

    /// Sorted, deduplicated, non-empty journal labels
    pub async fn distinct_venues(&self) -> Result<Vec<String>> {
        PaperEntity::find()
            .select_only()
            .column(PaperColumn::Journal)
            .distinct()
            .filter(PaperColumn::Journal.ne(""))
            .order_by_asc(PaperColumn::Journal)
            .into_tuple::<String>()
            .all(self.conn())
            .await
            .map_err(Into::into)
    }
}

fn with_venue(query: Select<PaperEntity>, venue: Option<&str>) -> Select<PaperEntity> {
    match non_empty(venue) {
        Some(venue) => query.filter(PaperColumn::Journal.eq(venue)),
        None => query,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Publication dates are ISO-like text, so newer sorts greater
fn is_newer(incoming: Option<&str>, stored: Option<&str>) -> bool {
    match (non_empty(incoming), non_empty(stored)) {
        (Some(incoming), Some(stored)) => incoming > stored,
        _ => false,
    }
}
