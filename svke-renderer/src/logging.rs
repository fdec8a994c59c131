//! `tracing` subscriber setup for binaries and tests embedding the renderer.

use crate::error::{RendererError, Result};
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs an fmt subscriber on stderr filtered by `RUST_LOG`, defaulting to `info`.
///
/// Does nothing if a global subscriber is already set.
pub fn init_minimal_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    let _ = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Like [`init_minimal_logging`], with `level` as the fallback when `RUST_LOG` is unset.
///
/// # Errors
///
/// [`RendererError::Config`] if `level` is not a known level name.
pub fn init_logging(level: &str) -> Result<()> {
    let level = parse_level(level)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    if fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global subscriber already set, keeping it.");
    }
    Ok(())
}

fn parse_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(RendererError::Config(format!("unknown log level '{}'", other))),
    }
}
