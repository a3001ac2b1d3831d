//! Shared logging setup for the quarry binary.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "quarry=info,quarry_engine=info,quarry_client=info,quarry_state=info";

/// Logging configuration for the binary.
pub struct LogConfig<'a> {
    pub verbose: bool,
    /// When set, a plain log file is appended under this directory in
    /// addition to stderr output.
    pub log_dir: Option<&'a Path>,
}

/// Initialize tracing with stderr output and an optional per-run log file.
///
/// `RUST_LOG` overrides the default filter; `--verbose` raises the stderr
/// filter to debug for the quarry crates.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let base_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };
    let stderr_filter = if config.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("quarry=debug,quarry_engine=debug,quarry_client=debug,quarry_state=debug"))
    } else {
        base_filter()
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    match config.log_dir {
        Some(dir) => {
            let file = Arc::new(open_log_file(dir)?);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_filter(base_filter());
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry().with(stderr_layer).init();
        }
    }

    Ok(())
}

fn open_log_file(dir: &Path) -> Result<std::fs::File> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    let path = dir.join("quarry.log");
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}
