//! Migration Runner - Executes migrations against the database
//!
//! A run works on a single connection: it takes the migration lock, makes sure
//! the schema and ledger table exist, then applies every pending file in its
//! own transaction, strictly in filename order. The first failure rolls back
//! that file's transaction and ends the run. The lock and the connection are
//! released on every path.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use super::definitions::{
    AppliedMigration, MigrationFile, MigrationRunResult, MigrationScript, MigrationStatus,
    MigrationStatusEntry, RunOptions,
};
use super::manager::MigrationManager;
use crate::backends::{MigrationBackend, MigrationConnection, MigrationTransaction};
use crate::error::{OrmError, OrmResult};

/// Migration runner that executes migrations against a database
pub struct MigrationRunner<B: MigrationBackend> {
    manager: MigrationManager,
    backend: B,
}

impl<B: MigrationBackend> MigrationRunner<B> {
    /// Create a new migration runner
    pub fn new(manager: MigrationManager, backend: B) -> Self {
        Self { manager, backend }
    }

    /// Get the migration manager
    pub fn manager(&self) -> &MigrationManager {
        &self.manager
    }

    /// Get the database backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run all pending migrations
    pub async fn run_migrations(&self, options: RunOptions) -> OrmResult<MigrationRunResult> {
        let start_time = Instant::now();

        let files = self.manager.discover()?;
        if files.is_empty() {
            tracing::info!(
                "No migrations found in {}",
                self.manager.config().migrations_dir.display()
            );
            return Ok(MigrationRunResult {
                discovered_count: 0,
                applied_migrations: Vec::new(),
                skipped_count: 0,
                execution_time_ms: start_time.elapsed().as_millis(),
            });
        }

        let mut conn = self.backend.connect().await?;
        let result = self.run_locked(conn.as_mut(), &files, options).await;
        let closed = conn.close().await;

        let mut run = finish(result, closed, "close database connection")?;
        run.execution_time_ms = start_time.elapsed().as_millis();
        Ok(run)
    }

    /// Get migration status for all migrations on disk and in the ledger
    pub async fn migration_status(&self) -> OrmResult<Vec<MigrationStatusEntry>> {
        let files = self.manager.discover()?;

        let mut conn = self.backend.connect().await?;
        let result = self.read_ledger(conn.as_mut()).await;
        let closed = conn.close().await;
        let applied = finish(result, closed, "close database connection")?;

        let recorded: HashMap<&str, &AppliedMigration> = applied
            .iter()
            .map(|m| (m.filename.as_str(), m))
            .collect();

        let mut entries = Vec::with_capacity(files.len());
        for file in &files {
            let status = match recorded.get(file.filename.as_str()) {
                None => MigrationStatus::Pending,
                Some(record) => {
                    if self.is_modified(file, record)? {
                        MigrationStatus::Modified {
                            applied_at: record.applied_at,
                        }
                    } else {
                        MigrationStatus::Applied {
                            applied_at: record.applied_at,
                        }
                    }
                }
            };
            entries.push(MigrationStatusEntry {
                filename: file.filename.clone(),
                status,
            });
        }

        let on_disk: HashSet<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        for record in applied.iter().filter(|m| !on_disk.contains(m.filename.as_str())) {
            entries.push(MigrationStatusEntry {
                filename: record.filename.clone(),
                status: MigrationStatus::Missing {
                    applied_at: record.applied_at,
                },
            });
        }

        Ok(entries)
    }

    async fn run_locked(
        &self,
        conn: &mut dyn MigrationConnection,
        files: &[MigrationFile],
        options: RunOptions,
    ) -> OrmResult<MigrationRunResult> {
        self.acquire_lock(conn).await?;
        let result = self.apply_pending(conn, files, options).await;
        let released = self.release_lock(conn).await;
        finish(result, released, "release migration lock")
    }

    async fn apply_pending(
        &self,
        conn: &mut dyn MigrationConnection,
        files: &[MigrationFile],
        options: RunOptions,
    ) -> OrmResult<MigrationRunResult> {
        self.ensure_migrations_table(conn).await?;

        let applied = conn
            .fetch_applied(&self.manager.applied_migrations_sql())
            .await
            .map_err(|e| OrmError::Migration(format!("Failed to query applied migrations: {}", e)))?;
        self.verify_checksums(files, &applied, options)?;

        let applied_names: HashSet<&str> = applied.iter().map(|m| m.filename.as_str()).collect();
        let pending: Vec<&MigrationFile> = files
            .iter()
            .filter(|f| !applied_names.contains(f.filename.as_str()))
            .collect();
        let skipped_count = files.len() - pending.len();

        if pending.is_empty() {
            tracing::info!("Migrations already up to date ({} applied)", skipped_count);
        }

        let mut applied_migrations = Vec::with_capacity(pending.len());
        for file in pending {
            let script = self.manager.load(file)?;
            self.apply_migration(conn, &script).await?;
            applied_migrations.push(script.filename);
        }

        Ok(MigrationRunResult {
            discovered_count: files.len(),
            applied_migrations,
            skipped_count,
            execution_time_ms: 0,
        })
    }

    /// Apply a single migration
    async fn apply_migration(
        &self,
        conn: &mut dyn MigrationConnection,
        script: &MigrationScript,
    ) -> OrmResult<()> {
        tracing::info!("Applying migration: {}", script.filename);

        let mut transaction = conn.begin_transaction().await?;
        match self.execute_migration(transaction.as_mut(), script).await {
            Ok(()) => transaction.commit().await.map_err(|e| {
                OrmError::Migration(format!(
                    "Failed to commit migration {}: {}",
                    script.filename, e
                ))
            }),
            Err(e) => {
                tracing::error!("Migration {} failed, rolling back: {}", script.filename, e);
                if let Err(rollback_err) = transaction.rollback().await {
                    tracing::warn!(
                        "Rollback of migration {} failed: {}",
                        script.filename,
                        rollback_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn execute_migration(
        &self,
        transaction: &mut dyn MigrationTransaction,
        script: &MigrationScript,
    ) -> OrmResult<()> {
        if !script.sql.trim().is_empty() {
            transaction.execute_batch(&script.sql).await.map_err(|e| {
                OrmError::Migration(format!(
                    "Failed to execute migration {}: {}",
                    script.filename, e
                ))
            })?;
        }

        transaction
            .execute(
                &self.manager.record_migration_sql(),
                &[script.filename.as_str(), script.checksum.as_str()],
            )
            .await
            .map_err(|e| {
                OrmError::Migration(format!(
                    "Failed to record migration {}: {}",
                    script.filename, e
                ))
            })?;

        Ok(())
    }

    /// Ensure the target schema and migrations table exist
    async fn ensure_migrations_table(&self, conn: &mut dyn MigrationConnection) -> OrmResult<()> {
        let schema = &self.manager.config().schema;

        conn.execute(&self.manager.create_schema_sql(), &[])
            .await
            .map_err(|e| OrmError::Migration(format!("Failed to create schema {}: {}", schema, e)))?;

        for sql in [
            self.manager.create_migrations_table_sql(),
            self.manager.add_checksum_column_sql(),
        ] {
            conn.execute(&sql, &[]).await.map_err(|e| {
                OrmError::Migration(format!("Failed to create migrations table: {}", e))
            })?;
        }

        tracing::debug!("Migrations table {} ready", self.manager.config().qualified_table());
        Ok(())
    }

    async fn read_ledger(
        &self,
        conn: &mut dyn MigrationConnection,
    ) -> OrmResult<Vec<AppliedMigration>> {
        let config = self.manager.config();
        if !conn
            .table_exists(&config.schema, &config.migrations_table)
            .await?
        {
            return Ok(Vec::new());
        }
        conn.fetch_applied(&self.manager.applied_migrations_sql())
            .await
    }

    fn verify_checksums(
        &self,
        files: &[MigrationFile],
        applied: &[AppliedMigration],
        options: RunOptions,
    ) -> OrmResult<()> {
        let recorded: HashMap<&str, &AppliedMigration> = applied
            .iter()
            .map(|m| (m.filename.as_str(), m))
            .collect();

        for file in files {
            let Some(record) = recorded.get(file.filename.as_str()) else {
                continue;
            };
            let Some(recorded_checksum) = &record.checksum else {
                continue;
            };

            let current = self.manager.current_checksum(file)?;
            if &current == recorded_checksum {
                continue;
            }

            if options.allow_modified {
                tracing::warn!(
                    "Migration {} changed after it was applied; it will not be re-run",
                    file.filename
                );
            } else {
                return Err(OrmError::ChecksumMismatch {
                    filename: file.filename.clone(),
                    recorded: recorded_checksum.clone(),
                    current,
                });
            }
        }

        Ok(())
    }

    fn is_modified(&self, file: &MigrationFile, record: &AppliedMigration) -> OrmResult<bool> {
        match &record.checksum {
            Some(recorded) => Ok(&self.manager.current_checksum(file)? != recorded),
            None => Ok(false),
        }
    }

    async fn acquire_lock(&self, conn: &mut dyn MigrationConnection) -> OrmResult<()> {
        let key = self.manager.lock_key();
        tracing::debug!("Acquiring migration lock {}", key);
        conn.execute(self.manager.acquire_lock_sql(), &[key.as_str()])
            .await
            .map_err(|e| OrmError::Lock(format!("Failed to acquire migration lock {}: {}", key, e)))?;
        Ok(())
    }

    async fn release_lock(&self, conn: &mut dyn MigrationConnection) -> OrmResult<()> {
        let key = self.manager.lock_key();
        conn.execute(self.manager.release_lock_sql(), &[key.as_str()])
            .await
            .map_err(|e| OrmError::Lock(format!("Failed to release migration lock {}: {}", key, e)))?;
        tracing::debug!("Released migration lock {}", key);
        Ok(())
    }
}

/// Combine an outcome with its cleanup step; the first error wins and a
/// cleanup error after it is only logged.
fn finish<T>(result: OrmResult<T>, cleanup: OrmResult<()>, what: &str) -> OrmResult<T> {
    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup_err)) => {
            tracing::warn!("Failed to {} after error: {}", what, cleanup_err);
            Err(e)
        }
    }
}
