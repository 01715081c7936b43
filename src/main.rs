//! cohortworks - roster-driven OpenAlex works harvester
//!
//! ## Usage
//!
//! ```bash
//! cohortworks run --roster roster.csv --output data/ucvm_dedup.csv --years 5
//! cohortworks dedup --output data/ucvm_dedup.csv
//! cohortworks project --roster roster.csv --output data/ucvm_dedup.csv
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cohortworks::config::{CatalogConfig, RetryPolicy, RunConfig, OPENALEX_API_BASE};
use cohortworks::dedup::{BackfillStatus, DedupReport};
use cohortworks::logging::init_logging;
use cohortworks::openalex::OpenAlexClient;
use cohortworks::pipeline::{self, RunContext};
use tracing::{error, info};

// ============================================================================
// CLI Definition
// ============================================================================

/// Harvest, deduplicate and project the OpenAlex works of an author roster
#[derive(Parser)]
#[command(name = "cohortworks")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every roster author, then deduplicate and project
    Run {
        #[command(flatten)]
        layout: LayoutArgs,

        #[command(flatten)]
        catalog: CatalogArgs,

        /// Authors fetched concurrently (results are still written in roster order)
        #[arg(long, default_value = "1")]
        concurrency: usize,
    },

    /// Re-run deduplication on existing compiled artifacts
    Dedup {
        #[command(flatten)]
        layout: LayoutArgs,
    },

    /// Re-run the per-author projection from an existing canonical artifact
    Project {
        #[command(flatten)]
        layout: LayoutArgs,
    },
}

#[derive(Args)]
struct LayoutArgs {
    /// Roster CSV with an OpenAlex id column
    #[arg(long, default_value = "data/roster.csv")]
    roster: PathBuf,

    /// Deduplicated output CSV; its directory holds every other artifact
    #[arg(short, long, default_value = "data/ucvm_dedup.csv")]
    output: PathBuf,

    /// Recent window length in years
    #[arg(long, default_value = "5")]
    years: u32,
}

#[derive(Args)]
struct CatalogArgs {
    /// Contact email for the OpenAlex polite pool
    #[arg(long, env = "OPENALEX_MAILTO")]
    mailto: Option<String>,

    /// Results per page (max 200)
    #[arg(long, env = "OPENALEX_PER_PAGE", default_value = "200")]
    per_page: u32,

    /// Retries per page on 429/5xx before giving up on an author
    #[arg(long, env = "OPENALEX_MAX_RETRIES", default_value = "6")]
    max_retries: u32,

    /// Backoff base; retry n waits base^n seconds
    #[arg(long, env = "OPENALEX_BACKOFF_BASE", default_value = "1.6")]
    backoff_base: f64,

    /// Request timeout in seconds
    #[arg(long, env = "OPENALEX_TIMEOUT", default_value = "30")]
    timeout: u64,

    /// OpenAlex API base URL
    #[arg(long, env = "OPENALEX_BASE_URL", default_value = OPENALEX_API_BASE)]
    base_url: String,

    /// Also retry connection and timeout failures
    #[arg(long)]
    retry_transport_errors: bool,
}

impl LayoutArgs {
    fn into_config(self) -> RunConfig {
        let mut config = RunConfig::new(self.roster, self.output);
        config.window_years = self.years;
        config
    }
}

impl CatalogArgs {
    fn apply(self, config: &mut RunConfig) {
        let defaults = CatalogConfig::default();
        config.catalog = CatalogConfig {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            mailto: self.mailto.unwrap_or(defaults.mailto),
            per_page: self.per_page,
            timeout: Duration::from_secs(self.timeout),
        };
        config.retry = RetryPolicy {
            max_retries: self.max_retries,
            backoff_base: self.backoff_base,
            retry_transport: self.retry_transport_errors,
        };
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (stage, config) = match cli.command {
        Commands::Run {
            layout,
            catalog,
            concurrency,
        } => {
            let mut config = layout.into_config();
            catalog.apply(&mut config);
            config.concurrency = concurrency;
            (Stage::Run, config)
        }
        Commands::Dedup { layout } => (Stage::Dedup, layout.into_config()),
        Commands::Project { layout } => (Stage::Project, layout.into_config()),
    };

    let mut ctx = RunContext::new(config).context("Invalid configuration")?;
    let log_file = ctx.log_file();
    init_logging(cli.debug, Some(&log_file)).context("Failed to initialise logging")?;
    info!(log = %log_file.display(), "Logging to file");

    let outcome = match stage {
        Stage::Run => run_full(&mut ctx).await,
        Stage::Dedup => pipeline::run_dedup(&ctx)
            .map(|report| print_dedup(&ctx, &report))
            .context("Deduplication failed"),
        Stage::Project => pipeline::run_projection(&ctx)
            .map(|rows| print_projection(&ctx, rows))
            .context("Projection failed"),
    };

    if let Err(e) = &outcome {
        error!(error = %format!("{e:#}"), "Run failed");
    }
    outcome
}

enum Stage {
    Run,
    Dedup,
    Project,
}

async fn run_full(ctx: &mut RunContext) -> Result<()> {
    info!(
        roster = %ctx.config.roster_path.display(),
        output = %ctx.config.output_path.display(),
        years = ctx.config.window_years,
        "Starting OpenAlex harvest"
    );

    let client = OpenAlexClient::new(ctx.config.catalog.clone())
        .context("Failed to build OpenAlex client")?;
    let summary = pipeline::run(ctx, &client).await.context("Pipeline failed")?;

    println!("Authors processed: {}", summary.authors_processed);
    println!("Authors skipped:   {}", summary.authors_skipped);
    println!("Failed fetches:    {}", summary.failed_fetches);
    println!(
        "Canonical works:   {} (from {} recent rows)",
        summary.dedup.output_rows, summary.recent_rows
    );
    match summary.per_author_rows {
        Some(rows) => println!("Per-author rows:   {rows}"),
        None => println!("Per-author rows:   skipped"),
    }
    println!("\n✓ Pipeline complete. Results in: {}", ctx.paths.output_dir.display());
    Ok(())
}

fn print_dedup(ctx: &RunContext, report: &DedupReport) {
    info!(rows = report.output_rows, "Deduplication complete");
    println!(
        "Canonical works:   {} (from {} recent rows)",
        report.output_rows, report.input_rows
    );
    if report.keyless_rows > 0 {
        println!("Keyless rows:      {}", report.keyless_rows);
    }
    match &report.backfill {
        BackfillStatus::NotAvailable => println!("Backfill:          no lifetime artifact"),
        BackfillStatus::Applied { cells } => println!("Backfill:          {cells} cells filled"),
        BackfillStatus::Skipped(reason) => println!("Backfill:          skipped ({reason})"),
    }
    println!("\n✓ Deduplication complete. Results in: {}", ctx.paths.canonical.display());
}

fn print_projection(ctx: &RunContext, rows: usize) {
    info!(rows, "Projection complete");
    println!("Per-author rows:   {rows}");
    println!("\n✓ Projection complete. Results in: {}", ctx.paths.per_author.display());
}
