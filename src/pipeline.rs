//! Run orchestration.
//!
//! A [`RunContext`] is built once per process and handed to each stage.
//! Fetches may overlap (`concurrency > 1`), but their results are consumed
//! in roster order and every append happens on the calling task, so each
//! compiled artifact has a single writer.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use futures::{stream, StreamExt};
use tracing::{error, info, warn};

use crate::artifact::{read_table, write_table, CompiledArtifact};
use crate::config::RunConfig;
use crate::dedup::{deduplicate_artifact, DedupReport};
use crate::error::{CohortError, Result};
use crate::fetcher::{fetch_author_works, WorksSource};
use crate::project::project;
use crate::roster::Roster;
use crate::schema::compiled_columns;
use crate::table::Table;
use crate::window::current_year;

/// Where each artifact of a run lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub output_dir: PathBuf,
    /// Every work of every author
    pub lifetime: PathBuf,
    /// Works inside the recent window
    pub recent: PathBuf,
    pub canonical: PathBuf,
    pub per_author: PathBuf,
    pub logs_dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(config: &RunConfig) -> Self {
        let output_dir = config.output_dir();
        let stem = config
            .output_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dedup".to_string());

        Self {
            lifetime: output_dir.join("openalex_all_authors_lifetime.csv"),
            recent: output_dir.join(format!(
                "openalex_all_authors_last{}y_key_fields.csv",
                config.window_years
            )),
            canonical: config.output_path.clone(),
            per_author: config
                .output_path
                .with_file_name(format!("{stem}_per_author.csv")),
            logs_dir: output_dir.join("logs"),
            output_dir,
        }
    }

    /// Per-run log file named after the start time.
    pub fn log_file(&self, started: DateTime<Local>) -> PathBuf {
        self.logs_dir
            .join(format!("etl_run_{}.log", started.format("%Y%m%d_%H%M%S")))
    }

    fn stale(&self) -> [&Path; 4] {
        [
            self.lifetime.as_path(),
            self.recent.as_path(),
            self.canonical.as_path(),
            self.per_author.as_path(),
        ]
    }
}

/// Explicit state of one process run.
#[derive(Debug)]
pub struct RunContext {
    pub config: RunConfig,
    pub paths: ArtifactPaths,
    pub started: DateTime<Local>,
    /// Artifacts from a previous run removed by [`RunContext::reset_artifacts`]
    pub removed: Vec<PathBuf>,
}

impl RunContext {
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        let paths = ArtifactPaths::new(&config);
        Ok(Self {
            config,
            paths,
            started: Local::now(),
            removed: Vec::new(),
        })
    }

    pub fn log_file(&self) -> PathBuf {
        self.paths.log_file(self.started)
    }

    /// Delete compiled and derived artifacts left by an earlier run.
    pub fn reset_artifacts(&mut self) -> Result<()> {
        for path in self.paths.stale() {
            if path.exists() {
                fs::remove_file(path)?;
                info!(path = %path.display(), "Removed old artifact");
                self.removed.push(path.to_path_buf());
            }
        }
        Ok(())
    }
}

/// Counters for one full run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub authors_total: usize,
    /// Authors that contributed recent-window rows
    pub authors_processed: usize,
    /// Roster rows without a usable identifier
    pub authors_skipped: usize,
    /// Authors whose pagination stopped early
    pub failed_fetches: usize,
    pub lifetime_rows: usize,
    pub recent_rows: usize,
    pub dedup: DedupReport,
    /// `None` when the projection failed
    pub per_author_rows: Option<usize>,
}

/// Fetch every roster author, then deduplicate and project.
pub async fn run<S: WorksSource>(ctx: &mut RunContext, source: &S) -> Result<RunSummary> {
    ctx.reset_artifacts()?;

    let roster = Roster::load(&ctx.config.roster_path, &ctx.config.roster_columns)?;
    if roster.is_empty() {
        warn!(path = %roster.path.display(), "Roster has no author rows");
    }
    let (targets, skipped_rows) = roster.targets();
    for row in &skipped_rows {
        warn!(row, "Roster row has no author id; skipping");
    }
    info!(
        authors = targets.len(),
        skipped = skipped_rows.len(),
        concurrency = ctx.config.concurrency,
        "Starting harvest"
    );

    let config = &ctx.config;
    let year = current_year();
    let mut lifetime = CompiledArtifact::new(&ctx.paths.lifetime, compiled_columns());
    let mut recent = CompiledArtifact::new(&ctx.paths.recent, compiled_columns());

    let mut harvests = stream::iter(targets.iter())
        .map(|target| fetch_author_works(source, target, config.window_years, year, &config.retry))
        .buffered(config.concurrency);

    let total = targets.len();
    let mut index = 0;
    let mut processed = 0;
    let mut skipped = skipped_rows.len();
    let mut failed_fetches = 0;

    while let Some(harvest) = harvests.next().await {
        let target = &targets[index];
        index += 1;

        let Some(author_uri) = harvest.author_uri.as_deref() else {
            skipped += 1;
            continue;
        };
        if harvest.fetch.as_ref().is_some_and(|f| !f.termination.is_complete()) {
            failed_fetches += 1;
        }

        lifetime.append(&harvest.all)?;
        if harvest.recent.is_empty() {
            info!(index, total, author = author_uri, name = %target.name, "No recent works for author");
            continue;
        }
        recent.append(&harvest.recent)?;
        processed += 1;
        info!(
            index,
            total,
            author = author_uri,
            name = %target.name,
            all = harvest.all.len(),
            recent = harvest.recent.len(),
            "Author done"
        );
    }
    drop(harvests);

    if processed == 0 {
        error!("No authors produced recent-window rows");
        return Err(CohortError::NoRecentOutput);
    }

    let dedup = run_dedup(ctx)?;

    let per_author_rows = match project_to_file(ctx, &roster) {
        Ok(rows) => Some(rows),
        Err(e) => {
            warn!(error = %e, "Per-author projection failed; skipping");
            None
        }
    };

    let summary = RunSummary {
        authors_total: roster.len(),
        authors_processed: processed,
        authors_skipped: skipped,
        failed_fetches,
        lifetime_rows: lifetime.rows_written(),
        recent_rows: recent.rows_written(),
        dedup,
        per_author_rows,
    };
    info!(
        processed = summary.authors_processed,
        skipped = summary.authors_skipped,
        failed = summary.failed_fetches,
        lifetime_rows = summary.lifetime_rows,
        recent_rows = summary.recent_rows,
        canonical_rows = summary.dedup.output_rows,
        "Run complete"
    );
    Ok(summary)
}

/// Deduplicate the recent artifact into the canonical output.
pub fn run_dedup(ctx: &RunContext) -> Result<DedupReport> {
    let (canonical, report) =
        deduplicate_artifact(&ctx.paths.recent, Some(ctx.paths.lifetime.as_path()))?;
    write_table(&ctx.paths.canonical, &canonical)?;
    info!(path = %ctx.paths.canonical.display(), rows = canonical.len(), "Wrote canonical works");
    Ok(report)
}

/// Re-project an existing canonical artifact against the roster.
pub fn run_projection(ctx: &RunContext) -> Result<usize> {
    let roster = Roster::load(&ctx.config.roster_path, &ctx.config.roster_columns)?;
    project_to_file(ctx, &roster)
}

fn project_to_file(ctx: &RunContext, roster: &Roster) -> Result<usize> {
    let canonical = read_table(&ctx.paths.canonical)?;
    if canonical.is_empty() {
        warn!(path = %ctx.paths.canonical.display(), "Canonical artifact has no rows");
    }
    let names: HashMap<String, String> = roster.name_lookup();
    let projected: Table = project(&canonical, &names);
    write_table(&ctx.paths.per_author, &projected)?;
    info!(path = %ctx.paths.per_author.display(), rows = projected.len(), "Wrote per-author works");
    Ok(projected.len())
}
