//! Run configuration.
//!
//! The CLI (and its `OPENALEX_*` environment fallbacks) is parsed in
//! `main.rs` and converted into these typed structs once at start-up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CohortError, Result};

/// OpenAlex API base URL
pub const OPENALEX_API_BASE: &str = "https://api.openalex.org";

/// Maximum results per page (OpenAlex limit)
pub const MAX_PER_PAGE: u32 = 200;

/// Catalog endpoint settings.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    /// Email for polite pool access
    pub mailto: String,
    pub per_page: u32,
    pub timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: OPENALEX_API_BASE.to_string(),
            mailto: "cohortworks@example.org".to_string(),
            per_page: MAX_PER_PAGE,
            timeout: Duration::from_secs(30),
        }
    }
}

impl CatalogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
            return Err(CohortError::Config(format!(
                "per-page must be within 1..={MAX_PER_PAGE}, got {}",
                self.per_page
            )));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| CohortError::Config(format!("invalid base url {}: {e}", self.base_url)))?;
        Ok(())
    }

    pub fn user_agent(&self) -> String {
        format!(
            "cohortworks/{} (mailto:{})",
            env!("CARGO_PKG_VERSION"),
            self.mailto
        )
    }
}

/// Retry/backoff policy for one author's pagination loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff_base^n` seconds.
    pub backoff_base: f64,
    /// Let connection/timeout failures consume the retry budget instead
    /// of abandoning the author immediately.
    pub retry_transport: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            backoff_base: 1.6,
            retry_transport: false,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        Duration::from_secs_f64(self.backoff_base.powi(exponent).max(0.0))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.backoff_base.is_finite() || self.backoff_base <= 0.0 {
            return Err(CohortError::Config(format!(
                "backoff base must be a positive number, got {}",
                self.backoff_base
            )));
        }
        Ok(())
    }
}

/// Accepted header names for each logical roster field.
#[derive(Debug, Clone)]
pub struct RosterColumns {
    pub id_aliases: Vec<String>,
    pub name_aliases: Vec<String>,
}

impl Default for RosterColumns {
    fn default() -> Self {
        Self {
            id_aliases: ["OpenAlexID", "openalex_id", "author_openalex_id", "OpenAlex ID"]
                .map(String::from)
                .to_vec(),
            name_aliases: ["Name", "Author", "FullName", "author_name"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub roster_path: PathBuf,
    /// Deduplicated output; its parent directory holds every other artifact.
    pub output_path: PathBuf,
    pub window_years: u32,
    pub concurrency: usize,
    pub catalog: CatalogConfig,
    pub retry: RetryPolicy,
    pub roster_columns: RosterColumns,
}

impl RunConfig {
    pub fn new(roster_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            roster_path: roster_path.into(),
            output_path: output_path.into(),
            window_years: 5,
            concurrency: 1,
            catalog: CatalogConfig::default(),
            retry: RetryPolicy::default(),
            roster_columns: RosterColumns::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_years == 0 {
            return Err(CohortError::Config("window must be at least one year".into()));
        }
        if self.concurrency == 0 {
            return Err(CohortError::Config("concurrency must be at least 1".into()));
        }
        self.catalog.validate()?;
        self.retry.validate()
    }

    /// Directory holding compiled artifacts and logs.
    pub fn output_dir(&self) -> PathBuf {
        match self.output_path.parent() {
            Some(dir) if dir != Path::new("") => dir.to_path_buf(),
            _ => PathBuf::from("data"),
        }
    }
}
