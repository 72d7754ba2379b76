//! Configuration sources
//!
//! Values are read once into an immutable [`EnvSnapshot`]. Sources are
//! consulted in order and the first one defining a key wins, so the process
//! environment always overrides values coming from local env files. Env files
//! are parsed, never exported into the process environment.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use super::validation::ConfigError;

/// Env files looked up in the working directory, highest precedence first.
pub const DEFAULT_ENV_FILES: [&str; 2] = ["env.local", ".env"];

/// Configuration source information for debugging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value loaded from environment variable
    EnvVar(String),
    /// Default value used
    Default(String),
    /// Value loaded from an env file
    File(String),
    /// Value provided programmatically
    Programmatic,
}

impl ConfigSource {
    /// Check if source is environment variable
    pub fn is_env_var(&self) -> bool {
        matches!(self, ConfigSource::EnvVar(_))
    }

    /// Check if source is default value
    pub fn is_default(&self) -> bool {
        matches!(self, ConfigSource::Default(_))
    }

    /// Check if source is from file
    pub fn is_file(&self) -> bool {
        matches!(self, ConfigSource::File(_))
    }

    /// Get source description
    pub fn description(&self) -> String {
        match self {
            ConfigSource::EnvVar(var) => format!("Environment variable: {}", var),
            ConfigSource::Default(value) => format!("Default value: {}", value),
            ConfigSource::File(path) => format!("Env file: {}", path),
            ConfigSource::Programmatic => "Programmatically set".to_string(),
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A place configuration values can be read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvSource {
    /// The current process environment
    Process,
    /// A dotenv-style file; skipped when it does not exist
    File(PathBuf),
}

impl EnvSource {
    /// Default source order for a working directory: process environment,
    /// then `env.local`, then `.env`.
    pub fn defaults_for(dir: &Path) -> Vec<EnvSource> {
        let mut sources = vec![EnvSource::Process];
        sources.extend(
            DEFAULT_ENV_FILES
                .iter()
                .map(|name| EnvSource::File(dir.join(name))),
        );
        sources
    }
}

/// Immutable view of the configuration environment
#[derive(Clone, Default)]
pub struct EnvSnapshot {
    values: HashMap<String, (String, ConfigSource)>,
}

impl EnvSnapshot {
    /// Load the default sources for `dir`
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        Self::from_sources(&EnvSource::defaults_for(dir))
    }

    /// Build a snapshot from an ordered list of sources, highest precedence first
    pub fn from_sources(sources: &[EnvSource]) -> Result<Self, ConfigError> {
        let mut snapshot = Self::default();

        for source in sources {
            match source {
                EnvSource::Process => {
                    for (key, value) in std::env::vars_os() {
                        if let (Ok(key), Ok(value)) = (key.into_string(), value.into_string()) {
                            let origin = ConfigSource::EnvVar(key.clone());
                            snapshot.insert_if_absent(key, value, origin);
                        }
                    }
                }
                EnvSource::File(path) => snapshot.merge_file(path)?,
            }
        }

        Ok(snapshot)
    }

    /// Build a snapshot from explicit key/value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut snapshot = Self::default();
        for (key, value) in pairs {
            snapshot.insert_if_absent(key.into(), value.into(), ConfigSource::Programmatic);
        }
        snapshot
    }

    fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        if !path.is_file() {
            return Ok(());
        }

        let path_display = path.display().to_string();
        let parse_error = |e: dotenvy::Error| ConfigError::ParseError {
            path: path_display.clone(),
            message: e.to_string(),
        };

        let mut loaded = 0usize;
        for item in dotenvy::from_path_iter(path).map_err(parse_error)? {
            let (key, value) = item.map_err(parse_error)?;
            if self.insert_if_absent(key, value, ConfigSource::File(path_display.clone())) {
                loaded += 1;
            }
        }

        tracing::debug!("Loaded {} variable(s) from {}", loaded, path_display);
        Ok(())
    }

    fn insert_if_absent(&mut self, key: String, value: String, origin: ConfigSource) -> bool {
        if self.values.contains_key(&key) {
            return false;
        }
        self.values.insert(key, (value, origin));
        true
    }

    /// Raw value for `key`, empty strings included
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|(value, _)| value.as_str())
    }

    /// Value for `key`, treating an empty string as unset
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }

    /// Where the value for `key` came from
    pub fn source_of(&self, key: &str) -> Option<&ConfigSource> {
        self.values.get(key).map(|(_, source)| source)
    }

    /// Resolve `key`, falling back to `default` when unset or empty
    pub fn get_or_default(&self, key: &str, default: &str) -> (String, ConfigSource) {
        match self.get_non_empty(key) {
            Some(value) => (value.to_string(), self.origin(key)),
            None => (default.to_string(), ConfigSource::Default(default.to_string())),
        }
    }

    /// Resolve a required `key`; unset or empty is an error
    pub fn get_required(&self, key: &str) -> Result<(String, ConfigSource), ConfigError> {
        self.get_non_empty(key)
            .map(|value| (value.to_string(), self.origin(key)))
            .ok_or_else(|| ConfigError::missing_env_var(key))
    }

    fn origin(&self, key: &str) -> ConfigSource {
        self.source_of(key)
            .cloned()
            .unwrap_or(ConfigSource::Programmatic)
    }
}

// Values may hold credentials; only keys are shown.
impl fmt::Debug for EnvSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("EnvSnapshot").field("keys", &keys).finish()
    }
}
