//! Logging configuration using tracing
//!
//! Provides structured logging to stderr and, optionally, to a file, with
//! support for the RUST_LOG environment variable.

use crate::config::LogConfig;
use crate::{KgraphError, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber
///
/// Sets up structured logging with:
/// - Filtering via RUST_LOG, falling back to `config.level`
/// - Formatted output to stderr
/// - Plain-text output appended to `config.file`, when set
///
/// # Example RUST_LOG values
/// - `RUST_LOG=info` - Show info and above
/// - `RUST_LOG=kgraph=debug` - Debug level for the kgraph crate
/// - `RUST_LOG=kgraph=debug,kgraph_extract=info` - Different levels per crate
///
/// # Errors
/// Returns an error if the log file cannot be opened or the subscriber has
/// already been initialized
pub fn init(config: &LogConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
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
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| KgraphError::Other(format!("Failed to initialize tracing: {}", e)))?;

    Ok(())
}

/// Initialize logging for tests (no-op if already initialized)
pub fn init_test() {
    let _ = init(&LogConfig {
        level: "debug".to_string(),
        file: None,
    });
}
