//! Cursor pagination with retry/backoff.
//!
//! One author's works are fetched strictly sequentially: request a page,
//! keep its results, follow `next_cursor`, stop on an empty page or a
//! missing cursor. Rate limiting and transient 5xx responses are retried
//! with exponential backoff; every other failure abandons the author but
//! keeps whatever was already accumulated.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::RetryPolicy;
use crate::error::SourceError;
use crate::flatten::{flatten_records, FlattenReport};
use crate::openalex::{bare_author_id, ensure_author_uri};
use crate::schema;
use crate::table::FlatRow;
use crate::window::{recent_rows, window_start};

/// Start-of-sequence cursor
pub const START_CURSOR: &str = "*";

/// One page of raw works.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub results: Vec<Value>,
    pub next_cursor: Option<String>,
}

/// A paginated catalog of works filterable by author.
pub trait WorksSource {
    fn fetch_page(
        &self,
        author_uri: &str,
        cursor: &str,
    ) -> impl Future<Output = Result<Page, SourceError>> + Send;
}

/// Why pagination stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Empty page or no next cursor
    Completed,
    RetriesExhausted { last_error: String },
    HttpStatus { status: u16 },
    Transport(String),
    Decode(String),
}

impl Termination {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// What one author's pagination loop did.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    pub requests: u32,
    pub pages: u32,
    pub retries: u32,
    /// Backoff delays actually slept, in order.
    pub delays: Vec<Duration>,
    pub termination: Termination,
}

impl Default for FetchReport {
    fn default() -> Self {
        Self {
            requests: 0,
            pages: 0,
            retries: 0,
            delays: Vec::new(),
            termination: Termination::Completed,
        }
    }
}

/// Fetch every page of works for `author_uri`.
///
/// Never fails: aborted fetches return the records gathered so far and
/// record the reason in [`FetchReport::termination`].
pub async fn paginate<S: WorksSource>(
    source: &S,
    author_uri: &str,
    policy: &RetryPolicy,
) -> (Vec<Value>, FetchReport) {
    let mut records = Vec::new();
    let mut report = FetchReport::default();
    let mut cursor = START_CURSOR.to_string();
    let mut attempt = 0u32;

    loop {
        report.requests += 1;

        match source.fetch_page(author_uri, &cursor).await {
            Err(e) if should_retry(&e, policy) => {
                attempt += 1;
                if attempt > policy.max_retries {
                    error!(
                        author = author_uri,
                        cursor = %cursor,
                        error = %e,
                        max_retries = policy.max_retries,
                        "Max retries exceeded; aborting fetch for this author"
                    );
                    report.termination = Termination::RetriesExhausted {
                        last_error: e.to_string(),
                    };
                    break;
                }

                let delay = policy.backoff(attempt);
                warn!(
                    author = author_uri,
                    cursor = %cursor,
                    error = %e,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_secs = delay.as_secs_f64(),
                    "Retriable OpenAlex failure, backing off"
                );
                tokio::time::sleep(delay).await;
                report.retries += 1;
                report.delays.push(delay);
            }
            Err(SourceError::Status { code }) => {
                error!(author = author_uri, cursor = %cursor, status = code, "HTTP error from OpenAlex");
                report.termination = Termination::HttpStatus { status: code };
                break;
            }
            Err(SourceError::Transport(msg)) => {
                error!(author = author_uri, cursor = %cursor, error = %msg, "OpenAlex request failed");
                report.termination = Termination::Transport(msg);
                break;
            }
            Err(SourceError::Decode(msg)) => {
                error!(author = author_uri, cursor = %cursor, error = %msg, "Malformed OpenAlex response");
                report.termination = Termination::Decode(msg);
                break;
            }
            Ok(page) => {
                debug!(
                    author = author_uri,
                    cursor = %cursor,
                    count = page.results.len(),
                    "Fetched page"
                );
                if page.results.is_empty() {
                    break;
                }
                report.pages += 1;
                records.extend(page.results);

                match page.next_cursor {
                    Some(next) => cursor = next,
                    None => break,
                }
                attempt = 0;
            }
        }
    }

    (records, report)
}

fn should_retry(e: &SourceError, policy: &RetryPolicy) -> bool {
    e.is_retriable_status() || (policy.retry_transport && matches!(e, SourceError::Transport(_)))
}

/// A roster author to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorTarget {
    /// Bare id or full URI, as found in the roster
    pub id: String,
    pub name: String,
}

/// Flattened works of one author, split by window.
#[derive(Debug, Default)]
pub struct AuthorHarvest {
    pub author_uri: Option<String>,
    pub all: Vec<FlatRow>,
    pub recent: Vec<FlatRow>,
    /// `None` when the identifier was unusable and nothing was requested.
    pub fetch: Option<FetchReport>,
    pub flatten: FlattenReport,
}

/// Fetch, flatten, window and tag one author's works.
///
/// `min_year` comes from [`window_start`]; pass the window explicitly so
/// tests do not depend on the clock.
pub async fn fetch_author_works<S: WorksSource>(
    source: &S,
    author: &AuthorTarget,
    window_years: u32,
    current_year: i32,
    policy: &RetryPolicy,
) -> AuthorHarvest {
    let Some(author_uri) = ensure_author_uri(&author.id) else {
        warn!(author = %author.id, name = %author.name, "Empty or invalid author id; skipping fetch");
        return AuthorHarvest::default();
    };

    let min_year = window_start(current_year, window_years);
    info!(author = %author_uri, window_years, min_year, "OpenAlex fetch");

    let (records, report) = paginate(source, &author_uri, policy).await;
    if records.is_empty() {
        info!(author = %author_uri, "No works returned from OpenAlex for this author");
    }

    let (mut all, flatten) = flatten_records(&records);
    if flatten.skipped_entries > 0 || flatten.skipped_records > 0 {
        debug!(
            author = %author_uri,
            skipped_entries = flatten.skipped_entries,
            skipped_records = flatten.skipped_records,
            "Skipped malformed entries while flattening"
        );
    }

    let tag_name = match author.name.trim() {
        "" => bare_author_id(&author_uri),
        name => name.to_string(),
    };
    for row in &mut all {
        row.set(schema::TAG_AUTHOR_NAME, tag_name.as_str());
        row.set(schema::TAG_AUTHOR_ID, author_uri.as_str());
    }

    let recent = recent_rows(&all, min_year);

    AuthorHarvest {
        author_uri: Some(author_uri),
        all,
        recent,
        fetch: Some(report),
        flatten,
    }
}
