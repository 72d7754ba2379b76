use showroom_core::ConfigError;
use showroom_orm::OrmError;
use thiserror::Error;

/// Errors surfaced to the user by the CLI
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Orm(#[from] OrmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("Failed to serialize output: {0}")]
    Serialization(#[from] serde_json::Error),
}
