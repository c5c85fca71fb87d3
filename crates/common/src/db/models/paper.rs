//! Paper entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stored review status; "picked" lives in `is_picked`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperStatus {
    New,
    Archived,
}

impl PaperStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaperStatus::New => "new",
            PaperStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for PaperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaperStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(PaperStatus::New),
            "archived" => Ok(PaperStatus::Archived),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

impl From<String> for PaperStatus {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(PaperStatus::New)
    }
}

impl From<PaperStatus> for String {
    fn from(status: PaperStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "papers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// Author names joined with ", "
    #[sea_orm(column_type = "Text")]
    pub authors: String,

    #[sea_orm(column_type = "Text")]
    pub journal: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub published: Option<String>,

    /// Normalized DOI, primary identity
    #[sea_orm(column_type = "Text", nullable, unique)]
    pub doi: Option<String>,

    /// Fallback identity when no DOI is known
    #[sea_orm(column_type = "Text")]
    pub link: String,

    #[sea_orm(column_name = "abstract", column_type = "Text", nullable)]
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,

    /// `new` or `archived`
    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub is_picked: bool,

    pub created_at: DateTimeUtc,

    pub exported_at: Option<DateTimeUtc>,
}

impl Model {
    pub fn paper_status(&self) -> PaperStatus {
        PaperStatus::from(self.status.clone())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_text() {
        assert_eq!(String::from(PaperStatus::Archived), "archived");
        assert_eq!(PaperStatus::from("new".to_string()), PaperStatus::New);
        assert_eq!("ARCHIVED".parse::<PaperStatus>(), Ok(PaperStatus::Archived));
        assert!("picked".parse::<PaperStatus>().is_err());
    }
}
