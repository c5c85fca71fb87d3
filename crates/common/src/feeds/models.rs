use serde::{Deserialize, Serialize};

/// One configured feed endpoint; `name` becomes the journal label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

impl FeedSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// A parsed feed entry waiting to be upserted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub title: String,
    /// Author names joined with ", "
    pub authors: String,
    pub link: String,
    pub published: Option<String>,
    pub journal: String,
    pub doi: Option<String>,
    pub abstract_text: Option<String>,
}

impl CandidateRecord {
    /// Dedup key: DOI when present, otherwise the link
    pub fn identity(&self) -> &str {
        self.doi
            .as_deref()
            .filter(|doi| !doi.is_empty())
            .unwrap_or(&self.link)
    }
}

/// Normalize a DOI: strip resolver/`doi:` prefixes, trim and lower-case.
///
/// Returns `None` when nothing DOI-shaped remains.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let mut doi = raw.trim();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi.org/",
        "doi:",
        "DOI:",
    ] {
        if let Some(rest) = doi.strip_prefix(prefix) {
            doi = rest.trim();
            break;
        }
    }

    if doi.starts_with("10.") && doi.contains('/') {
        Some(doi.to_lowercase())
    } else {
        None
    }
}
