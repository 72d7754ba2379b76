//! Database connection configuration

use std::collections::HashMap;
use std::fmt;

use super::app_config::AppConfigTrait;
use super::sources::{ConfigSource, EnvSnapshot};
use super::validation::ConfigError;

/// Schema migrations are written against and applied into by default
pub const DEFAULT_SCHEMA: &str = "selection";

/// Port used when `DATABASE_PORT` is not set
pub const DEFAULT_PORT: u16 = 5432;

const MAX_IDENTIFIER_LEN: usize = 63;

/// Where to connect
#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    /// A full connection string (`DATABASE_URL`)
    Url(String),
    /// Discrete connection parameters
    Params {
        host: String,
        user: String,
        password: String,
        database: String,
        port: u16,
    },
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionTarget::Url(url) => f.debug_tuple("Url").field(&redact_url(url)).finish(),
            ConnectionTarget::Params {
                host,
                user,
                database,
                port,
                ..
            } => f
                .debug_struct("Params")
                .field("host", host)
                .field("user", user)
                .field("password", &"***")
                .field("database", database)
                .field("port", port)
                .finish(),
        }
    }
}

/// Database configuration consumed by the migration runner
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub target: ConnectionTarget,
    pub schema: String,
    pub ssl: bool,
    sources: HashMap<String, ConfigSource>,
}

impl DatabaseConfig {
    /// Build a configuration without going through the environment
    pub fn new(target: ConnectionTarget, schema: impl Into<String>, ssl: bool) -> Self {
        Self {
            target,
            schema: schema.into(),
            ssl,
            sources: HashMap::new(),
        }
    }

    /// Whether migrations are applied into [`DEFAULT_SCHEMA`]
    pub fn is_default_schema(&self) -> bool {
        self.schema == DEFAULT_SCHEMA
    }
}

impl AppConfigTrait for DatabaseConfig {
    fn from_snapshot(env: &EnvSnapshot) -> Result<Self, ConfigError> {
        let mut sources = HashMap::new();

        let target = if let Some(url) = env.get_non_empty("DATABASE_URL") {
            let source = env
                .source_of("DATABASE_URL")
                .cloned()
                .unwrap_or(ConfigSource::Programmatic);
            sources.insert("url".to_string(), source);
            ConnectionTarget::Url(url.to_string())
        } else {
            let (host, host_source) = env.get_required("DATABASE_HOST")?;
            let (user, user_source) = env.get_required("DATABASE_USER")?;
            let (password, password_source) = env.get_required("DATABASE_PASSWORD")?;
            let (database, database_source) = env.get_required("DATABASE_NAME")?;
            let (port, port_source) = env.get_or_default("DATABASE_PORT", &DEFAULT_PORT.to_string());
            let port = port.parse::<u16>().map_err(|_| {
                ConfigError::invalid_value("port", port.clone(), "valid port number (0-65535)")
            })?;

            sources.insert("host".to_string(), host_source);
            sources.insert("user".to_string(), user_source);
            sources.insert("password".to_string(), password_source);
            sources.insert("database".to_string(), database_source);
            sources.insert("port".to_string(), port_source);

            ConnectionTarget::Params {
                host,
                user,
                password,
                database,
                port,
            }
        };

        // PostgreSQL folds the unquoted name used in DDL to lowercase
        let (schema, schema_source) = env.get_or_default("DATABASE_SCHEMA", DEFAULT_SCHEMA);
        let schema = schema.to_ascii_lowercase();
        sources.insert("schema".to_string(), schema_source);

        let ssl = parse_bool(env.get("DATABASE_SSL"), true);
        sources.insert(
            "ssl".to_string(),
            match (env.get_non_empty("DATABASE_SSL"), env.source_of("DATABASE_SSL")) {
                (Some(_), Some(source)) => source.clone(),
                _ => ConfigSource::Default("true".to_string()),
            },
        );

        let config = DatabaseConfig {
            target,
            schema,
            ssl,
            sources,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_identifier(&self.schema) {
            return Err(ConfigError::invalid_value(
                "schema",
                self.schema.clone(),
                "a lowercase SQL identifier ([a-z_][a-z0-9_]*, at most 63 bytes)",
            ));
        }

        match &self.target {
            ConnectionTarget::Url(url) if url.is_empty() => Err(ConfigError::validation_failed(
                "url",
                "Database URL cannot be empty",
            )),
            ConnectionTarget::Params { port: 0, .. } => {
                Err(ConfigError::validation_failed("port", "Port cannot be 0"))
            }
            _ => Ok(()),
        }
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        self.sources.clone()
    }
}

/// Interpret a boolean-like setting. Unset or empty yields `fallback`;
/// otherwise `1`, `true`, `yes` and `on` (any case) are true and anything
/// else is false.
pub fn parse_bool(value: Option<&str>, fallback: bool) -> bool {
    match value {
        None | Some("") => fallback,
        Some(raw) => matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
    }
}

/// Whether `name` can be interpolated into SQL as an unquoted identifier and
/// still match its own spelling in the catalog
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first == '_' => {}
        _ => return false,
    }
    name.len() <= MAX_IDENTIFIER_LEN
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}
