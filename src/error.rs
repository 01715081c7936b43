//! Custom error types for cohortworks.
//!
//! Library functions return `Result<T, CohortError>`; a single catalog
//! request reports failures as [`SourceError`] so the fetcher can decide
//! between retrying and giving up on an author.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for cohortworks operations.
#[derive(Debug, Error)]
pub enum CohortError {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP client construction error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Roster could not be loaded
    #[error(transparent)]
    Roster(#[from] RosterError),

    /// An existing artifact does not carry the expected header
    #[error("Schema mismatch in {path}: expected {expected} columns, found {found}")]
    SchemaMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    /// A compiled artifact is missing a column the stage needs
    #[error("Artifact {path} has no '{column}' column")]
    MissingColumn { path: PathBuf, column: String },

    /// Every author came back without recent-window rows
    #[error("No authors produced recent-window output")]
    NoRecentOutput,
}

/// Failure of a single catalog page request.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Non-success HTTP status
    #[error("HTTP status {code}")]
    Status { code: u16 },

    /// Connection, timeout or body transfer failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body is not a works page
    #[error("Decode error: {0}")]
    Decode(String),
}

impl SourceError {
    /// Rate limiting and transient server-side statuses.
    pub fn is_retriable_status(&self) -> bool {
        matches!(self, Self::Status { code } if matches!(code, 429 | 500 | 502 | 503 | 504))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Status {
                code: status.as_u16(),
            },
            None => Self::Transport(e.to_string()),
        }
    }
}

/// Roster loading errors.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Failed to read roster {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// None of the accepted aliases matched a header
    #[error("Roster {path} has no identifier column (accepted: {aliases})")]
    MissingColumn { path: PathBuf, aliases: String },
}

/// Result type alias using `CohortError`
pub type Result<T> = std::result::Result<T, CohortError>;
