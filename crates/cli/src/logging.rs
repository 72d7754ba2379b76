//! Tracing subscriber setup
//!
//! Log lines go to stderr so command output on stdout stays clean. `RUST_LOG`
//! takes precedence over `LOG_LEVEL`; both are read from the env snapshot, so
//! env files can set them too.

use std::io;

use showroom_core::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::CliError;

/// Install the global subscriber described by `config`
pub fn init_logging(config: &LoggingConfig) -> Result<(), CliError> {
    let filter = build_filter(config)?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init(),
        LogFormat::Pretty => registry
            .with(Layer::new().with_writer(io::stderr).pretty())
            .try_init(),
        LogFormat::Compact => registry
            .with(Layer::new().with_writer(io::stderr).compact())
            .try_init(),
    };
    installed.map_err(|e| CliError::Logging(e.to_string()))?;

    tracing::debug!(
        target: "showroom::logging",
        "Logging initialized (level: {}, format: {:?})",
        config.level,
        config.format
    );
    Ok(())
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, CliError> {
    let directives = config.filter.as_deref().unwrap_or(&config.level);
    EnvFilter::try_new(directives).map_err(|e| CliError::Logging(e.to_string()))
}
