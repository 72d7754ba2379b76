pub mod config;

// Re-export key types for convenience
pub use config::{
    AppConfigTrait, ConfigError, ConfigSource, ConnectionTarget, DatabaseConfig, EnvSnapshot,
    EnvSource, LogFormat, LoggingConfig, MigrationsConfig, DEFAULT_MIGRATIONS_DIR,
    DEFAULT_SCHEMA,
};
