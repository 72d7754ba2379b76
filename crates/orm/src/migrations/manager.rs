//! Migration Manager - File system operations for migrations
//!
//! Handles discovering, reading, rewriting and creating migration files, and
//! builds the SQL the runner issues against the ledger table.

use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use super::checksum::checksum;
use super::definitions::{MigrationConfig, MigrationFile, MigrationScript};
use super::rewrite::{SchemaRewriter, SCHEMA_PLACEHOLDER};
use crate::error::{OrmError, OrmResult};

const MIGRATION_EXTENSION: &str = ".sql";
const DEFAULT_SEQUENCE_WIDTH: usize = 3;

/// Migration manager for discovering, loading and creating migrations
#[derive(Debug, Clone)]
pub struct MigrationManager {
    config: MigrationConfig,
    rewriter: SchemaRewriter,
}

impl MigrationManager {
    /// Create a new migration manager with default configuration
    pub fn new() -> OrmResult<Self> {
        Self::with_config(MigrationConfig::default())
    }

    /// Create a new migration manager with custom configuration
    pub fn with_config(config: MigrationConfig) -> OrmResult<Self> {
        let rewriter = SchemaRewriter::new(&config.default_schema, &config.schema)?;
        Ok(Self { config, rewriter })
    }

    /// Get the configuration
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// List migration files, sorted by filename
    pub fn discover(&self) -> OrmResult<Vec<MigrationFile>> {
        let dir = &self.config.migrations_dir;
        let entries = fs::read_dir(dir).map_err(|e| {
            OrmError::Io(format!(
                "Failed to read migrations directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| OrmError::Io(format!("Failed to read directory entry: {}", e)))?;

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let Some(filename) = entry.file_name().to_str().map(str::to_owned) else {
                tracing::warn!("Skipping migration with non UTF-8 name: {}", path.display());
                continue;
            };

            if filename.ends_with(MIGRATION_EXTENSION) {
                files.push(MigrationFile { filename, path });
            }
        }

        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }

    /// Read a migration file and rewrite it for the target schema
    pub fn load(&self, file: &MigrationFile) -> OrmResult<MigrationScript> {
        let content = self.read(file)?;
        Ok(MigrationScript {
            filename: file.filename.clone(),
            sql: self.rewriter.rewrite(&content),
            checksum: checksum(&content),
        })
    }

    /// Checksum of a migration file's current content
    pub fn current_checksum(&self, file: &MigrationFile) -> OrmResult<String> {
        Ok(checksum(&self.read(file)?))
    }

    fn read(&self, file: &MigrationFile) -> OrmResult<String> {
        fs::read_to_string(&file.path).map_err(|e| {
            OrmError::Io(format!(
                "Failed to read migration file {}: {}",
                file.path.display(),
                e
            ))
        })
    }

    /// Create a new migration file named after the next sequence number
    pub fn create_migration(&self, name: &str) -> OrmResult<PathBuf> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(OrmError::Migration(format!(
                "Migration name '{}' must contain letters or digits",
                name
            )));
        }

        fs::create_dir_all(&self.config.migrations_dir).map_err(|e| {
            OrmError::Io(format!("Failed to create migrations directory: {}", e))
        })?;

        let existing = self.discover()?;
        let (sequence, width) = next_sequence(existing.iter().map(|f| f.filename.as_str()));
        let filename = format!("{:0width$}_{}{}", sequence, slug, MIGRATION_EXTENSION, width = width);
        let path = self.config.migrations_dir.join(&filename);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    OrmError::Migration(format!("Migration {} already exists", filename))
                }
                _ => OrmError::Io(format!("Failed to write migration file: {}", e)),
            })?;

        file.write_all(self.create_migration_template(name).as_bytes())
            .map_err(|e| OrmError::Io(format!("Failed to write migration file: {}", e)))?;

        Ok(path)
    }

    /// Create migration template content
    fn create_migration_template(&self, name: &str) -> String {
        format!(
            "-- Migration: {name}\n\
             -- Created: {created}\n\
             --\n\
             -- {placeholder} is replaced with the target schema when this file is applied.\n\n\
             CREATE SCHEMA IF NOT EXISTS {placeholder};\n\n",
            name = name,
            created = Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            placeholder = SCHEMA_PLACEHOLDER,
        )
    }

    /// Key the migration advisory lock is taken on
    pub fn lock_key(&self) -> String {
        format!("showroom.migrations.{}", self.config.schema)
    }

    /// SQL to take the migration lock; blocks until it is available
    pub fn acquire_lock_sql(&self) -> &'static str {
        "SELECT pg_advisory_lock(hashtext($1))"
    }

    /// SQL to release the migration lock
    pub fn release_lock_sql(&self) -> &'static str {
        "SELECT pg_advisory_unlock(hashtext($1))"
    }

    /// SQL to create the target schema
    pub fn create_schema_sql(&self) -> String {
        format!("CREATE SCHEMA IF NOT EXISTS {}", self.config.schema)
    }

    /// SQL to create the migrations tracking table
    pub fn create_migrations_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                id          bigserial PRIMARY KEY,\n    \
                filename    text NOT NULL UNIQUE,\n    \
                applied_at  timestamptz NOT NULL DEFAULT now(),\n    \
                checksum    text\n\
            )",
            self.config.qualified_table()
        )
    }

    /// SQL adding the checksum column to ledgers created without it
    pub fn add_checksum_column_sql(&self) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS checksum text",
            self.config.qualified_table()
        )
    }

    /// SQL to get applied migrations
    pub fn applied_migrations_sql(&self) -> String {
        format!(
            "SELECT filename, applied_at, checksum FROM {} ORDER BY filename ASC",
            self.config.qualified_table()
        )
    }

    /// SQL to record a migration as applied; binds filename and checksum
    pub fn record_migration_sql(&self) -> String {
        format!(
            "INSERT INTO {} (filename, checksum) VALUES ($1, $2)",
            self.config.qualified_table()
        )
    }
}

/// Lowercase `name`, collapsing anything that is not a letter or digit into `_`
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}

/// Next numeric prefix and the zero-padding width to print it with
fn next_sequence<'a>(filenames: impl Iterator<Item = &'a str>) -> (u64, usize) {
    let mut highest: Option<(u64, usize)> = None;

    for filename in filenames {
        let digits: &str = {
            let end = filename
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(filename.len());
            &filename[..end]
        };
        let Ok(number) = digits.parse::<u64>() else {
            continue;
        };
        if highest.map_or(true, |(current, _)| number > current) {
            highest = Some((number, digits.len()));
        }
    }

    match highest {
        Some((number, width)) => {
            let next = number + 1;
            if next.to_string().len() > width {
                tracing::warn!(
                    "Migration sequence {} no longer fits {} digits; lexical order will break",
                    next,
                    width
                );
            }
            (next, width)
        }
        None => (1, DEFAULT_SEQUENCE_WIDTH),
    }
}
