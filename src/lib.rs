//! # cohortworks
//!
//! Harvests the OpenAlex works of a roster of authors, compiles them into
//! fixed-schema CSV artifacts, and produces a merge-aware deduplicated
//! dataset plus a per-author view of it.
//!
//! ## Modules
//!
//! - [`fetcher`] - Cursor pagination with retry/backoff over a [`fetcher::WorksSource`]
//! - [`openalex`] - Reqwest-backed OpenAlex `/works` source and id helpers
//! - [`flatten`] - Nested work JSON to flat rows
//! - [`window`] - Recent-window split by publication year
//! - [`artifact`] - Fixed-schema CSV appends and whole-table reads/writes
//! - [`dedup`] - Merge-aware deduplication with lifetime backfill
//! - [`project`] - Per-author projection of canonical works
//! - [`roster`] - Roster loading with column aliases
//! - [`pipeline`] - Run context and orchestration
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cohortworks::{config::RunConfig, openalex::OpenAlexClient, pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RunConfig::new("roster.csv", "data/ucvm_dedup.csv");
//!     let client = OpenAlexClient::new(config.catalog.clone())?;
//!     let mut ctx = pipeline::RunContext::new(config)?;
//!     let summary = pipeline::run(&mut ctx, &client).await?;
//!     println!("{} canonical works", summary.dedup.output_rows);
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod flatten;
pub mod logging;
pub mod openalex;
pub mod pipeline;
pub mod project;
pub mod roster;
pub mod schema;
pub mod table;
pub mod window;

pub use error::{CohortError, Result};
