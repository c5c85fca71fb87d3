//! Pick/unpick and export of picked papers

use crate::errors::Result;
use paperbot_common::db::models::Paper;
use paperbot_common::db::Repository;
use paperbot_common::export::{ExportFormat, Exporter};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Row cap for "all picked" reads
pub const PICKED_EXPORT_LIMIT: u64 = 10_000;

/// A written export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub count: usize,
    pub format: ExportFormat,
}

/// Paper fields a text query can match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryField {
    Title,
    Journal,
    Authors,
}

impl QueryField {
    pub const ALL: [QueryField; 3] = [QueryField::Title, QueryField::Journal, QueryField::Authors];

    fn value<'a>(&self, paper: &'a Paper) -> &'a str {
        match self {
            QueryField::Title => &paper.title,
            QueryField::Journal => &paper.journal,
            QueryField::Authors => &paper.authors,
        }
    }
}

/// Keep papers where any of `fields` contains `query`, ignoring case.
///
/// A blank query keeps everything.
pub fn filter_by_query(papers: Vec<Paper>, query: &str, fields: &[QueryField]) -> Vec<Paper> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return papers;
    }

    papers
        .into_iter()
        .filter(|paper| {
            fields
                .iter()
                .any(|field| field.value(paper).to_lowercase().contains(&needle))
        })
        .collect()
}

#[derive(Clone)]
pub struct CurationService {
    repository: Repository,
    exporter: Exporter,
}

impl CurationService {
    pub fn new(repository: Repository, exporter: Exporter) -> Self {
        Self {
            repository,
            exporter,
        }
    }

    pub async fn pick(&self, ids: &[i32]) -> Result<u64> {
        Ok(self.repository.pick(ids).await?)
    }

    pub async fn unpick(&self, ids: &[i32]) -> Result<u64> {
        Ok(self.repository.unpick(ids).await?)
    }

    /// Flip one paper's pick; `None` for an unknown id
    pub async fn toggle_pick(&self, id: i32) -> Result<Option<bool>> {
        let Some(paper) = self.repository.find_by_id(id).await? else {
            return Ok(None);
        };

        if paper.is_picked {
            self.repository.unpick(&[id]).await?;
        } else {
            self.repository.pick(&[id]).await?;
        }
        Ok(Some(!paper.is_picked))
    }

    /// Export every picked paper and stamp it; `None` when nothing is picked
    pub async fn export_picked(&self, subdir: &str, format: ExportFormat) -> Result<Option<ExportOutcome>> {
        let papers = self.repository.find_picked(PICKED_EXPORT_LIMIT).await?;
        if papers.is_empty() {
            info!("Nothing picked, skipping export");
            return Ok(None);
        }

        let path = self.exporter.export(&papers, subdir, format)?;
        let ids: Vec<i32> = papers.iter().map(|p| p.id).collect();
        self.repository.mark_exported(&ids).await?;

        Ok(Some(ExportOutcome {
            path,
            count: papers.len(),
            format,
        }))
    }
}
