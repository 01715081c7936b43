//! Tracing setup: console output plus an optional plain-text run log.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{CohortError, Result};

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the level chosen by `debug`. When `log_file` is
/// given, the same events are mirrored there without ANSI colours.
pub fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            let file = File::create(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| CohortError::Config(format!("failed to install logger: {e}")))
}
