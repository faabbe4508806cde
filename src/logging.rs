use std::{fs::OpenOptions, sync::Mutex};

use tracing_subscriber::{fmt::Subscriber, EnvFilter};

use crate::{config::Config, error::ConfigError};

/// Initialize logging into the configured log file.
///
/// The terminal belongs to the dashboard, so nothing is written to stdout.
/// `--log-filter` wins over `RUST_LOG`; without either the level is `info`.
pub fn init(config: &Config) -> Result<(), ConfigError> {
    let filter = match config.log_filter.as_deref() {
        Some(directives) => {
            EnvFilter::try_new(directives).map_err(|e| ConfigError::Logging(e.to_string()))?
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)?;

    Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))
}
