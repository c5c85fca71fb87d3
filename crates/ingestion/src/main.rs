//! PaperBot CLI
//!
//! One-shot commands over the paper store:
//! 1. `fetch` runs a fetch cycle over the configured feeds
//! 2. `list`, `stats`, `journals` read the store
//! 3. `pick`, `unpick`, `reset-picks`, `export` drive curation
//! 4. `lookup` queries the metadata service for one DOI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use paperbot_common::config::{AppConfig, ObservabilityConfig};
use paperbot_common::db::models::{Paper, PaperStatus};
use paperbot_common::db::{DbPool, Repository, SortKey};
use paperbot_common::export::{ExportFormat, Exporter};
use paperbot_common::feeds::normalize_doi;
use paperbot_common::metadata::create_provider;
use paperbot_common::VERSION;
use paperbot_ingestion::curation::{filter_by_query, CurationService, QueryField};
use paperbot_ingestion::pipeline::IngestionPipeline;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Journal feed ingestion and curation
#[derive(Parser)]
#[command(name = "paperbot")]
#[command(about = "Collect journal feeds, curate papers and export reading lists")]
#[command(version)]
struct Cli {
    /// Config file (defaults to config/{default,$PAPERBOT_ENV,local})
    #[arg(short, long, global = true, env = "PAPERBOT_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one fetch cycle
    Fetch {
        /// Concurrent source downloads
        #[arg(long)]
        workers: Option<usize>,

        /// Skip metadata enrichment
        #[arg(long)]
        no_enrich: bool,
    },

    /// List papers
    List {
        #[arg(long, value_enum, default_value = "new")]
        status: ListStatus,

        /// Only papers from this journal
        #[arg(long)]
        journal: Option<String>,

        #[arg(long, default_value = "insertion")]
        sort: SortKey,

        #[arg(long, default_value = "50")]
        limit: u64,

        /// Case-insensitive match on title, journal or authors
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Pick papers by id
    Pick {
        #[arg(required = true)]
        ids: Vec<i32>,
    },

    /// Unpick papers by id
    Unpick {
        #[arg(required = true)]
        ids: Vec<i32>,
    },

    /// Clear every pick
    ResetPicks,

    /// Export picked papers
    Export {
        /// md, tex or csv (defaults to export.format)
        #[arg(short, long)]
        format: Option<ExportFormat>,

        /// Subdirectory under the export root
        #[arg(long)]
        subdir: Option<String>,
    },

    /// Paper counts by status
    Stats,

    /// Known journal labels
    Journals,

    /// Look up one DOI in the metadata service
    Lookup { doi: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum ListStatus {
    New,
    Archived,
    Picked,
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config.observability);
    info!(version = VERSION, "PaperBot starting");

    if let Commands::Lookup { doi } = &cli.command {
        return lookup(&config, doi).await;
    }

    let repository = Repository::new(DbPool::new(&config.database).await?);

    match cli.command {
        Commands::Fetch { workers, no_enrich } => {
            let pipeline =
                IngestionPipeline::from_config(&config, repository, !no_enrich, workers)?;
            let summary = pipeline.run_cycle().await?;

            println!("{}", summary.message());
            for failure in &summary.source_errors {
                println!("  skipped {}", failure);
            }
        }

        Commands::List {
            status,
            journal,
            sort,
            limit,
            query,
        } => {
            let journal = journal.as_deref();
            let papers = match status {
                ListStatus::New => {
                    repository
                        .find_by_status(PaperStatus::New, limit, sort, journal)
                        .await?
                }
                ListStatus::Archived => {
                    repository
                        .find_by_status(PaperStatus::Archived, limit, sort, journal)
                        .await?
                }
                ListStatus::Picked => repository.find_picked(limit).await?,
                ListStatus::All => repository.find_all(limit, sort, journal).await?,
            };
            let papers = match query.as_deref() {
                Some(q) => filter_by_query(papers, q, &QueryField::ALL),
                None => papers,
            };

            for paper in &papers {
                println!("{}", list_line(paper));
            }
            println!("{} paper(s)", papers.len());
        }

        Commands::Pick { ids } => {
            let changed = repository.pick(&ids).await?;
            println!("Picked {} paper(s)", changed);
        }

        Commands::Unpick { ids } => {
            let changed = repository.unpick(&ids).await?;
            println!("Unpicked {} paper(s)", changed);
        }

        Commands::ResetPicks => {
            let cleared = repository.reset_all_picked().await?;
            println!("Cleared {} pick(s)", cleared);
        }

        Commands::Export { format, subdir } => {
            let format = match format {
                Some(format) => format,
                None => config
                    .export
                    .format
                    .parse()
                    .map_err(anyhow::Error::msg)
                    .context("Invalid export.format")?,
            };
            let subdir = subdir.unwrap_or_else(|| config.export.subdir.clone());

            let service = CurationService::new(repository, Exporter::from_config(&config.export));
            match service.export_picked(&subdir, format).await? {
                Some(outcome) => println!(
                    "Exported {} paper(s) to {}",
                    outcome.count,
                    outcome.path.display()
                ),
                None => println!("No picked papers to export"),
            }
        }

        Commands::Stats => {
            let counts = repository.status_counts().await?;
            println!("new:      {}", counts.new);
            println!("picked:   {}", counts.picked);
            println!("archived: {}", counts.archived);
            println!("total:    {}", counts.total);
        }

        Commands::Journals => {
            for journal in repository.distinct_venues().await? {
                println!("{}", journal);
            }
        }

        Commands::Lookup { .. } => {}
    }

    Ok(())
}

async fn lookup(config: &AppConfig, raw: &str) -> Result<()> {
    let doi = normalize_doi(raw).with_context(|| format!("Not a DOI: {}", raw))?;
    let provider = create_provider(true, &config.metadata)?;
    let meta = provider.fetch(&doi).await?;

    println!("DOI:      {}", doi);
    println!("Authors:  {}", meta.authors.join(", "));
    println!("Venue:    {}", meta.venue);
    println!("Abstract: {}", meta.abstract_text);
    Ok(())
}

fn list_line(paper: &Paper) -> String {
    let published: String = paper
        .published
        .as_deref()
        .unwrap_or("")
        .chars()
        .take(10)
        .collect();
    format!(
        "{:>6} {} {:<10} {:<8} {} | {}",
        paper.id,
        if paper.is_picked { "*" } else { " " },
        published,
        paper.status,
        paper.journal,
        paper.title
    )
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}
