//! Tracing subscriber setup

use crate::config::LoggingConfig;
use crate::error::{EdgeError, Result};
use tracing_subscriber::EnvFilter;

/// Build the level filter: `RUST_LOG` if set, else the configured level
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            EdgeError::Config(format!("invalid log level '{}': {}", config.level, e))
        }),
    }
}

/// Install the global subscriber, emitting JSON lines if configured.
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;

    let installed = if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_line_number(true)
            .try_init()
    };

    installed.map_err(|e| EdgeError::Config(format!("cannot install logger: {}", e)))
}
