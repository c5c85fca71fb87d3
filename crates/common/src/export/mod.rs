//! Export of paper lists to Markdown, BibTeX and CSV
//!
//! Files land at `{root}/{subdir}/{%Y-%m-%d_%H%M}.{ext}`. Rendering keeps the
//! input order and depends only on the records and the supplied clock.

use crate::db::models::Paper;
use crate::errors::{AppError, Result};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Markdown,
    Bibtex,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Bibtex => "bib",
            ExportFormat::Csv => "csv",
        }
    }

    /// Short name used in metrics and responses
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Bibtex => "tex",
            ExportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "tex" | "bib" | "bibtex" => Ok(ExportFormat::Bibtex),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unsupported export format: {}", other)),
        }
    }
}

/// Writes rendered paper lists under an export root
#[derive(Debug, Clone)]
pub struct Exporter {
    root: PathBuf,
    citation_prefix: String,
}

impl Exporter {
    pub fn new(root: impl Into<PathBuf>, citation_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            citation_prefix: citation_prefix.into(),
        }
    }

    pub fn from_config(config: &crate::config::ExportConfig) -> Self {
        Self::new(config.root.clone(), config.citation_prefix.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Export using the local wall clock
    pub fn export(&self, papers: &[Paper], subdir: &str, format: ExportFormat) -> Result<PathBuf> {
        self.export_at(papers, subdir, format, Local::now().naive_local())
    }

    /// Export with an explicit timestamp
    pub fn export_at(
        &self,
        papers: &[Paper],
        subdir: &str,
        format: ExportFormat,
        now: NaiveDateTime,
    ) -> Result<PathBuf> {
        let dir = self.root.join(checked_subdir(subdir)?);
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!(
            "{}.{}",
            now.format("%Y-%m-%d_%H%M"),
            format.extension()
        ));
        let content = self.render(papers, format, now)?;
        std::fs::write(&path, content)?;

        crate::metrics::record_export(format.as_str());
        tracing::info!(
            path = %path.display(),
            format = %format,
            papers = papers.len(),
            "Export written"
        );
        Ok(path)
    }

    /// Render without touching the filesystem
    pub fn render(&self, papers: &[Paper], format: ExportFormat, now: NaiveDateTime) -> Result<String> {
        match format {
            ExportFormat::Markdown => Ok(render_markdown(papers, &now.format("%Y-%m-%d").to_string())),
            ExportFormat::Bibtex => Ok(render_bibtex(papers, &self.citation_prefix)),
            ExportFormat::Csv => render_csv(papers),
        }
    }
}

fn render_markdown(papers: &[Paper], export_date: &str) -> String {
    let mut lines = vec![format!("# PaperBot Export List ({})\n", export_date)];

    for paper in papers {
        let title = if paper.title.is_empty() {
            "(No title)"
        } else {
            paper.title.as_str()
        };
        lines.push(format!("## {}\n", title));

        if !paper.journal.is_empty() {
            lines.push(format!("- **Journal**: {}", paper.journal));
        }

        let authors = split_authors(&paper.authors);
        if !authors.is_empty() {
            let shown = if authors.len() > 3 {
                format!("{}, et al.", authors[..3].join(", "))
            } else {
                authors.join(", ")
            };
            lines.push(format!("- **Authors**: {}", shown));
        }

        if let Some(published) = paper.published.as_deref().filter(|p| !p.is_empty()) {
            lines.push(format!("- **Published**: {}", char_prefix(published, 10)));
        }

        match paper.doi.as_deref().filter(|d| !d.is_empty()) {
            Some(doi) => lines.push(format!("- **DOI**: [{}](https://doi.org/{})", doi, doi)),
            None if !paper.link.is_empty() => lines.push(format!("- **Link**: {}", paper.link)),
            None => {}
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn render_bibtex(papers: &[Paper], prefix: &str) -> String {
    let mut blocks = Vec::with_capacity(papers.len());

    for paper in papers {
        let published = paper.published.as_deref().unwrap_or("");
        let year = match char_prefix(published, 4) {
            "" => "0000".to_string(),
            year => year.to_string(),
        };
        let month = date_part(published, 5, 7);
        let day = date_part(published, 8, 10);

        let key = format!("{}_{}_{}_{}", prefix, year, paper.id, bib_slug(&paper.title, paper.id));
        let doi = paper.doi.as_deref().unwrap_or("").trim();

        let mut block = format!(
            "@article{{{key},\n  author  = {{{author}}},\n  title   = {{{title}}},\n  journal = {{{journal}}},\n  year    = {{{year}}},\n  month   = {{{month}}},\n  day     = {{{day}}},\n  doi     = {{{doi}}},",
            key = key,
            author = bib_author(&paper.authors),
            title = escape_braces(&paper.title),
            journal = escape_braces(&paper.journal),
            year = year,
            month = month,
            day = day,
            doi = doi,
        );
        if !doi.is_empty() {
            block.push_str(&format!("\n  url     = {{https://doi.org/{}}}", doi));
        }
        block.push_str("\n}\n");
        blocks.push(block);
    }

    blocks.join("\n")
}

/// `subdir` must stay below the export root: plain names only
fn checked_subdir(subdir: &str) -> Result<&Path> {
    let path = Path::new(subdir);
    if path.components().all(|c| matches!(c, Component::Normal(_))) {
        Ok(path)
    } else {
        Err(AppError::Validation {
            message: format!("export subdirectory must be a relative path of plain names: {:?}", subdir),
        })
    }
}

fn render_csv(papers: &[Paper]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    writer.write_record(["Title", "Journal", "Authors", "Date_Published", "DOI", "Added_Date"])?;

    for paper in papers {
        let authors = paper.authors.replace(',', "; ");
        let published = paper.published.as_deref().map(|p| char_prefix(p, 10)).unwrap_or("");
        let added = paper.created_at.format("%Y-%m-%d").to_string();

        writer.write_record([
            paper.title.as_str(),
            paper.journal.as_str(),
            authors.trim(),
            published,
            paper.doi.as_deref().unwrap_or(""),
            added.as_str(),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|e| AppError::Export {
        message: format!("CSV flush failed: {}", e),
    })?;
    String::from_utf8(bytes).map_err(|e| AppError::Export {
        message: format!("CSV output is not UTF-8: {}", e),
    })
}

/// Citation key slug: first three title words, lower-cased
pub fn bib_slug(title: &str, id: i32) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    let slug: String = cleaned
        .split_whitespace()
        .take(3)
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .take(40)
        .collect();

    if slug.is_empty() {
        format!("paper_{}", id)
    } else {
        slug
    }
}

/// `A and B and C`, with ` and others` past three names
pub fn bib_author(authors: &str) -> String {
    let parts = split_authors(authors);
    match parts.len() {
        0 => "Unknown".to_string(),
        1..=3 => parts.join(" and "),
        _ => format!("{} and others", parts[..3].join(" and ")),
    }
}

fn split_authors(authors: &str) -> Vec<&str> {
    authors
        .split([',', ';'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

fn char_prefix(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Month/day digits from an ISO-like date, `01` when too short
fn date_part(published: &str, start: usize, end: usize) -> String {
    if published.chars().count() >= end {
        published.chars().skip(start).take(end - start).collect()
    } else {
        "01".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::PaperStatus;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn paper(id: i32, title: &str, authors: &str, doi: Option<&str>) -> Paper {
        Paper {
            id,
            title: title.into(),
            authors: authors.into(),
            journal: "Nature".into(),
            published: Some("2024-03-05T10:00:00+00:00".into()),
            doi: doi.map(Into::into),
            link: format!("https://j.org/{}", id),
            abstract_text: None,
            status: PaperStatus::New.into(),
            is_picked: true,
            created_at: Utc.with_ymd_and_hms(2024, 3, 6, 8, 0, 0).unwrap(),
            exported_at: None,
        }
    }

    fn clock() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap()
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("markdown".parse::<ExportFormat>(), Ok(ExportFormat::Markdown));
        assert_eq!("TEX".parse::<ExportFormat>(), Ok(ExportFormat::Bibtex));
        assert_eq!("bib".parse::<ExportFormat>(), Ok(ExportFormat::Bibtex));
        assert_eq!("csv".parse::<ExportFormat>(), Ok(ExportFormat::Csv));
        assert!("pdf".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::Bibtex.extension(), "bib");
    }

    #[test]
    fn test_bib_slug() {
        assert_eq!(bib_slug("A Study, of Things!", 1), "a_study_of");
        assert_eq!(bib_slug("", 7), "paper_7");
        assert_eq!(bib_slug("!!! ???", 3), "paper_3");
        let long = bib_slug("Supercalifragilisticexpialidocious Antidisestablishmentarianism Words", 1);
        assert_eq!(long.chars().count(), 40);
    }

    #[test]
    fn test_bib_author() {
        assert_eq!(bib_author(""), "Unknown");
        assert_eq!(bib_author(" , ;"), "Unknown");
        assert_eq!(bib_author("A; B, C"), "A and B and C");
        assert_eq!(bib_author("A, B, C, D"), "A and B and C and others");
    }

    #[test]
    fn test_markdown() {
        let papers = vec![
            paper(1, "First", "A, B, C, D", Some("10.1000/first")),
            paper(2, "", "", None),
        ];
        let exporter = Exporter::new("unused", "paperbot");
        let text = exporter.render(&papers, ExportFormat::Markdown, clock()).unwrap();

        let expected = "# PaperBot Export List (2024-03-07)\n\n\
## First\n\n\
- **Journal**: Nature\n\
- **Authors**: A, B, C, et al.\n\
- **Published**: 2024-03-05\n\
- **DOI**: [10.1000/first](https://doi.org/10.1000/first)\n\
\n\
## (No title)\n\n\
- **Journal**: Nature\n\
- **Published**: 2024-03-05\n\
- **Link**: https://j.org/2\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_bibtex() {
        let papers = vec![paper(12, "Braces {in} Title", "Ada Lovelace", Some("10.1000/b"))];
        let exporter = Exporter::new("unused", "paperbot");
        let text = exporter.render(&papers, ExportFormat::Bibtex, clock()).unwrap();

        assert!(text.starts_with("@article{paperbot_2024_12_braces_in_title,\n"));
        assert!(text.contains("  author  = {Ada Lovelace},\n"));
        assert!(text.contains("  title   = {Braces {{in}} Title},\n"));
        assert!(text.contains("  month   = {03},\n  day     = {05},\n"));
        assert!(text.ends_with("  url     = {https://doi.org/10.1000/b}\n}\n"));
    }

    #[test]
    fn test_bibtex_partial_date() {
        let mut undated = paper(3, "Old", "X", None);
        undated.published = Some("2019".into());
        let exporter = Exporter::new("unused", "lab");
        let text = exporter.render(&[undated], ExportFormat::Bibtex, clock()).unwrap();

        assert!(text.starts_with("@article{lab_2019_3_old,"));
        assert!(text.contains("month   = {01}"));
        assert!(!text.contains("url"));
    }

    #[test]
    fn test_csv_quoting() {
        let papers = vec![paper(1, "Commas, quotes \"and\" more", "A, B", None)];
        let exporter = Exporter::new("unused", "paperbot");
        let text = exporter.render(&papers, ExportFormat::Csv, clock()).unwrap();

        assert!(text.ends_with("\r\n"));
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Title,Journal,Authors,Date_Published,DOI,Added_Date"));
        assert_eq!(
            lines.next(),
            Some("\"Commas, quotes \"\"and\"\" more\",Nature,A;  B,2024-03-05,,2024-03-06")
        );
    }

    #[test]
    fn test_export_writes_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path(), "paperbot");
        let papers = vec![paper(1, "First", "A", Some("10.1000/first"))];

        let path = exporter
            .export_at(&papers, "picked", ExportFormat::Csv, clock())
            .unwrap();
        assert_eq!(path, dir.path().join("picked").join("2024-03-07_0915.csv"));
        assert!(path.exists());

        // Same input and clock: byte-identical output
        let first = std::fs::read(&path).unwrap();
        exporter
            .export_at(&papers, "picked", ExportFormat::Csv, clock())
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[test]
    fn test_export_into_unwritable_root_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let exporter = Exporter::new(file.path(), "paperbot");
        let err = exporter
            .export_at(&[], "picked", ExportFormat::Markdown, clock())
            .unwrap_err();
        assert!(matches!(err, AppError::Export { .. }));
    }

    #[test]
    fn test_export_rejects_subdir_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("exports");
        let exporter = Exporter::new(&root, "paperbot");

        for subdir in ["../outside", "picked/../../up", "/tmp/abs", "./picked"] {
            let err = exporter
                .export_at(&[], subdir, ExportFormat::Markdown, clock())
                .unwrap_err();
            assert!(matches!(err, AppError::Validation { .. }), "{}", subdir);
        }
        assert!(!dir.path().join("outside").exists());

        let nested = exporter
            .export_at(&[], "picked/2024", ExportFormat::Markdown, clock())
            .unwrap();
        assert!(nested.starts_with(&root));
    }
}
