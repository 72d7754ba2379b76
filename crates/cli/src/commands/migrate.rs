use std::path::PathBuf;

use showroom_core::{AppConfigTrait, DatabaseConfig, EnvSnapshot, MigrationsConfig};
use showroom_orm::{
    MigrationConfig, MigrationManager, MigrationRunner, MigrationStatus, MigrationStatusEntry,
    PostgresBackend, RunOptions,
};

use crate::error::CliError;

/// Apply every pending migration
pub async fn run(
    env: &EnvSnapshot,
    dir: Option<PathBuf>,
    allow_modified: bool,
) -> Result<(), CliError> {
    let runner = runner_for(env, dir)?;
    let migrations_dir = runner.manager().config().migrations_dir.clone();

    let result = runner
        .run_migrations(RunOptions { allow_modified })
        .await?;

    if result.nothing_to_apply() {
        println!(
            "No migrations found in {}; nothing to apply",
            migrations_dir.display()
        );
    } else if result.up_to_date() {
        println!(
            "Migrations already up to date ({} applied)",
            result.skipped_count
        );
    } else {
        for filename in &result.applied_migrations {
            println!("  applied {}", filename);
        }
        println!(
            "Applied {} migration(s) in {}ms",
            result.applied_count(),
            result.execution_time_ms
        );
    }
    Ok(())
}

/// Show applied, modified, pending and missing migrations
pub async fn status(env: &EnvSnapshot, dir: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let runner = runner_for(env, dir)?;
    let entries = runner.migration_status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!(
            "No migrations found in {}",
            runner.manager().config().migrations_dir.display()
        );
        return Ok(());
    }

    println!("Migration status ({}):", runner.manager().config().schema);
    for entry in &entries {
        println!("  {}", status_line(entry));
    }
    Ok(())
}

/// Scaffold a new migration file
pub fn create(env: &EnvSnapshot, name: &str, dir: Option<PathBuf>) -> Result<(), CliError> {
    let dir = migrations_dir(env, dir)?;
    let manager = MigrationManager::with_config(MigrationConfig::new(
        dir,
        showroom_core::DEFAULT_SCHEMA,
    ))?;
    let path = manager.create_migration(name)?;
    println!("Created migration: {}", path.display());
    Ok(())
}

/// Database configuration is resolved before the directory is touched, so a
/// missing connection parameter is reported ahead of any I/O.
fn runner_for(
    env: &EnvSnapshot,
    dir: Option<PathBuf>,
) -> Result<MigrationRunner<PostgresBackend>, CliError> {
    let database = DatabaseConfig::from_snapshot(env)?;
    let dir = migrations_dir(env, dir)?;

    tracing::debug!("Using migrations in {} for schema {}", dir.display(), database.schema);

    let backend = PostgresBackend::from_config(&database)?;
    let manager = MigrationManager::with_config(MigrationConfig::for_database(dir, &database))?;
    Ok(MigrationRunner::new(manager, backend))
}

/// `--dir` wins over `MIGRATIONS_DIR`, which wins over the default
fn migrations_dir(env: &EnvSnapshot, flag: Option<PathBuf>) -> Result<PathBuf, CliError> {
    let config = match flag {
        Some(dir) => MigrationsConfig::new(dir),
        None => MigrationsConfig::from_snapshot(env)?,
    };
    config.validate()?;
    Ok(config.dir)
}

fn status_line(entry: &MigrationStatusEntry) -> String {
    match &entry.status {
        MigrationStatus::Applied { applied_at } => format!(
            "applied   {}  ({})",
            entry.filename,
            applied_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        MigrationStatus::Modified { applied_at } => format!(
            "modified  {}  (applied {}, changed since)",
            entry.filename,
            applied_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        MigrationStatus::Pending => format!("pending   {}", entry.filename),
        MigrationStatus::Missing { applied_at } => format!(
            "missing   {}  (applied {}, file not found)",
            entry.filename,
            applied_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
    }
}
