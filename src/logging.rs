//! tracing subscriber setup.
use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Where log records go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Only to `log.file` if configured; dropped otherwise. Used while the
    /// terminal UI owns the screen.
    FileOnly,
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(config: &LoggingConfig, target: LogTarget, verbose: bool) -> io::Result<()> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    if let Some(path) = &config.file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let _ = builder.with_ansi(false).with_writer(Mutex::new(file)).try_init();
        return Ok(());
    }
    if target == LogTarget::Stderr {
        let _ = builder.with_writer(io::stderr).try_init();
    }
    Ok(())
}
