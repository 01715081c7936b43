//! OpenAlex API Client
//!
//! Fetches author-filtered `/works` pages using cursor pagination.
//!
//! API Best Practices (per OpenAlex docs):
//! - Use `mailto:email` parameter for polite pool (10 req/s vs 1 req/s)
//! - Use `per-page=200` for maximum results per page
//! - Use `cursor=*` to start deep paging; follow `meta.next_cursor`

use std::sync::OnceLock;

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::CatalogConfig;
use crate::error::{CohortError, Result, SourceError};
use crate::fetcher::{Page, WorksSource};

/// Canonical prefix of OpenAlex entity URIs
const OPENALEX_URI_PREFIX: &str = "https://openalex.org/";

/// Reqwest-backed catalog source.
pub struct OpenAlexClient {
    client: Client,
    config: CatalogConfig,
}

impl OpenAlexClient {
    pub fn new(config: CatalogConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent())
            .default_headers(headers)
            .build()
            .map_err(CohortError::Network)?;

        Ok(Self { client, config })
    }

    fn works_url(&self) -> String {
        format!("{}/works", self.config.base_url.trim_end_matches('/'))
    }
}

impl WorksSource for OpenAlexClient {
    async fn fetch_page(&self, author_uri: &str, cursor: &str) -> std::result::Result<Page, SourceError> {
        let filter = format!("author.id:{author_uri}");
        let per_page = self.config.per_page.to_string();

        let response = self
            .client
            .get(self.works_url())
            .query(&[
                ("filter", filter.as_str()),
                ("per-page", per_page.as_str()),
                ("cursor", cursor),
                ("mailto", self.config.mailto.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                code: status.as_u16(),
            });
        }

        let body = response.text().await?;
        debug!(author = author_uri, cursor, bytes = body.len(), "Received works page");
        parse_page(&body)
    }
}

/// OpenAlex API response structures
#[derive(Debug, Deserialize)]
struct WorksResponse {
    #[serde(default)]
    meta: Option<WorksMeta>,
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct WorksMeta {
    next_cursor: Option<String>,
}

/// Parse one `/works` response body.
fn parse_page(json_str: &str) -> std::result::Result<Page, SourceError> {
    let response: WorksResponse = serde_json::from_str(json_str)
        .map_err(|e| SourceError::Decode(format!("Failed to parse OpenAlex response: {}", e)))?;

    let next_cursor = response
        .meta
        .and_then(|m| m.next_cursor)
        .filter(|c| !c.is_empty());

    Ok(Page {
        results: response.results,
        next_cursor,
    })
}

/// One entry of a work's `authorships` list.
#[derive(Debug, Deserialize)]
pub struct OpenAlexAuthorship {
    pub author_position: Option<String>,
    pub author: Option<OpenAlexAuthor>,
    /// Parsed entry by entry; malformed institutions are skipped.
    pub institutions: Option<Vec<Value>>,
    pub is_corresponding: Option<bool>,
    pub raw_author_name: Option<String>,
    /// Usually a list of strings, occasionally a bare string.
    pub raw_affiliation_strings: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAlexAuthor {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub orcid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAlexInstitution {
    pub display_name: Option<String>,
    pub country_code: Option<String>,
    pub ror: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAlexConcept {
    pub display_name: Option<String>,
}

/// Normalize an author identifier to its full OpenAlex URI.
///
/// Accepts `A##########` or `https://openalex.org/A##########`. Returns
/// `None` for empty or unusable input.
pub fn ensure_author_uri(raw: &str) -> Option<String> {
    let aid = raw.trim();
    if aid.is_empty() {
        return None;
    }
    if aid.starts_with("http://") || aid.starts_with("https://") {
        return url::Url::parse(aid)
            .ok()
            .filter(|u| u.host_str().is_some() && u.path() != "/")
            .map(|_| aid.to_string());
    }
    if aid.chars().any(|c| c.is_whitespace() || c == '/') {
        return None;
    }
    Some(format!("{OPENALEX_URI_PREFIX}{aid}"))
}

/// Strip the OpenAlex URI prefix (with or without `/authors/`) from an id.
pub fn bare_author_id(raw: &str) -> String {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    let re = PREFIX.get_or_init(|| {
        Regex::new(r"(?i)^https?://openalex\.org/(?:authors/)?").expect("OpenAlex prefix regex")
    });
    re.replace(raw.trim(), "").into_owned()
}
