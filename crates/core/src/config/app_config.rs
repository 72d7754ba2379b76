use std::collections::HashMap;
use std::path::PathBuf;

use super::sources::{ConfigSource, EnvSnapshot};
use super::validation::ConfigError;

/// Default location of migration files, relative to the working directory
pub const DEFAULT_MIGRATIONS_DIR: &str = "db/migrations";

/// Configuration trait for typed configuration sections
pub trait AppConfigTrait: Sized {
    /// Load the section from an environment snapshot
    fn from_snapshot(env: &EnvSnapshot) -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    /// `RUST_LOG`-style directives; take precedence over `level`
    pub filter: Option<String>,
    sources: HashMap<String, ConfigSource>,
}

/// Output format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::invalid_value(
                "format",
                s,
                "compact, pretty, or json",
            )),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            filter: None,
            sources: HashMap::new(),
        }
    }
}

impl AppConfigTrait for LoggingConfig {
    fn from_snapshot(env: &EnvSnapshot) -> Result<Self, ConfigError> {
        let (level, level_source) = env.get_or_default("LOG_LEVEL", "info");
        let (format, format_source) = env.get_or_default("LOG_FORMAT", "compact");
        let filter = env.get_non_empty("RUST_LOG").map(str::to_string);

        let mut sources = HashMap::new();
        sources.insert("level".to_string(), level_source);
        sources.insert("format".to_string(), format_source);
        if let Some(source) = env.source_of("RUST_LOG").filter(|_| filter.is_some()) {
            sources.insert("filter".to_string(), source.clone());
        }

        let config = LoggingConfig {
            level: level.to_lowercase(),
            format: format.parse()?,
            filter,
            sources,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(ConfigError::invalid_value(
                "level",
                self.level.clone(),
                "trace, debug, info, warn, or error",
            ));
        }
        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        self.sources.clone()
    }
}

/// Where migration files live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationsConfig {
    pub dir: PathBuf,
    source: ConfigSource,
}

impl MigrationsConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            source: ConfigSource::Programmatic,
        }
    }
}

impl AppConfigTrait for MigrationsConfig {
    fn from_snapshot(env: &EnvSnapshot) -> Result<Self, ConfigError> {
        let (dir, source) = env.get_or_default("MIGRATIONS_DIR", DEFAULT_MIGRATIONS_DIR);
        Ok(MigrationsConfig {
            dir: PathBuf::from(dir),
            source,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dir.as_os_str().is_empty() {
            return Err(ConfigError::validation_failed(
                "migrations_dir",
                "Migrations directory cannot be empty",
            ));
        }
        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        sources.insert("dir".to_string(), self.source.clone());
        sources
    }
}
