//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the fundamental types used throughout the migration system including
//! MigrationFile, AppliedMigration, and MigrationConfig structures.

use chrono::{DateTime, Utc};
use serde::Serialize;
use showroom_core::{DatabaseConfig, DEFAULT_SCHEMA};
use std::path::PathBuf;

/// Name of the ledger table created in every target schema
pub const MIGRATIONS_TABLE: &str = "schema_migrations";

/// A migration file discovered on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// File name; doubles as the migration identifier and ordering key
    pub filename: String,
    /// Full path to the file
    pub path: PathBuf,
}

/// A migration file read from disk and prepared for execution
#[derive(Debug, Clone)]
pub struct MigrationScript {
    pub filename: String,
    /// SQL after schema rewriting
    pub sql: String,
    /// Checksum of the file content as it is on disk
    pub checksum: String,
}

/// Row of the ledger table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub filename: String,
    pub applied_at: DateTime<Utc>,
    /// Absent for rows written before checksums were recorded
    pub checksum: Option<String>,
}

/// Configuration for the migration system
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
    /// Table name for tracking migrations
    pub migrations_table: String,
    /// Schema migrations are applied into
    pub schema: String,
    /// Schema name migration bodies are written against
    pub default_schema: String,
}

impl MigrationConfig {
    /// Configuration applying the files in `migrations_dir` into `schema`
    pub fn new(migrations_dir: impl Into<PathBuf>, schema: impl Into<String>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            schema: schema.into(),
            ..Self::default()
        }
    }

    /// Configuration targeting the schema of a resolved database configuration
    pub fn for_database(migrations_dir: impl Into<PathBuf>, database: &DatabaseConfig) -> Self {
        Self::new(migrations_dir, database.schema.clone())
    }

    /// Schema-qualified ledger table name
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema, self.migrations_table)
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from(showroom_core::DEFAULT_MIGRATIONS_DIR),
            migrations_table: MIGRATIONS_TABLE.to_string(),
            schema: DEFAULT_SCHEMA.to_string(),
            default_schema: DEFAULT_SCHEMA.to_string(),
        }
    }
}

/// Options for a single run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Warn instead of failing when an applied migration changed on disk
    pub allow_modified: bool,
}

/// Result of running migrations
#[derive(Debug, Clone)]
pub struct MigrationRunResult {
    /// Number of migration files found on disk
    pub discovered_count: usize,
    /// Filenames applied by this run, in order
    pub applied_migrations: Vec<String>,
    /// Number of migrations that were skipped (already applied)
    pub skipped_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    /// Number of migrations that were applied
    pub fn applied_count(&self) -> usize {
        self.applied_migrations.len()
    }

    /// No migration files existed at all
    pub fn nothing_to_apply(&self) -> bool {
        self.discovered_count == 0
    }

    /// Files existed but all of them were already applied
    pub fn up_to_date(&self) -> bool {
        self.discovered_count > 0 && self.applied_migrations.is_empty()
    }
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Migration is pending (not yet applied)
    Pending,
    /// Migration has been applied
    Applied { applied_at: DateTime<Utc> },
    /// Migration has been applied but the file changed since
    Modified { applied_at: DateTime<Utc> },
    /// Migration is recorded in the ledger but its file is gone
    Missing { applied_at: DateTime<Utc> },
}

/// Status of one migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatusEntry {
    pub filename: String,
    #[serde(flatten)]
    pub status: MigrationStatus,
}
