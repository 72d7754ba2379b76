//! In-memory migration backend used by the runner tests.
//!
//! Transactions buffer their work and only publish it on commit, and the
//! ledger enforces filename uniqueness, mirroring what PostgreSQL does.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use showroom_orm::{
    AppliedMigration, MigrationBackend, MigrationConnection, MigrationTransaction, OrmError,
    OrmResult,
};

#[derive(Debug, Default)]
pub struct MemoryState {
    pub ledger: Vec<AppliedMigration>,
    /// Bodies of committed migrations, in commit order
    pub committed_batches: Vec<String>,
    /// Every body sent to the database, rolled back ones included
    pub attempted_batches: Vec<String>,
    /// Connection-level statements, in order
    pub statements: Vec<String>,
    pub connections_opened: usize,
    pub connections_closed: usize,
    pub lock_held: bool,
    pub lock_acquisitions: usize,
    pub rollbacks: usize,
    pub table_created: bool,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    fail_on: Option<String>,
    refuse_connections: bool,
    recorded_elsewhere: Option<String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any migration body containing `marker`
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_on = Some(marker.to_string());
        self
    }

    /// Another runner records `filename` right after the ledger is read
    pub fn recorded_elsewhere(mut self, filename: &str) -> Self {
        self.recorded_elsewhere = Some(filename.to_string());
        self
    }

    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connections = true;
        self
    }

    /// Pretend `filename` was applied by an earlier run
    pub fn seed_applied(&self, filename: &str, checksum: Option<String>) {
        let mut state = self.state();
        state.table_created = true;
        state.ledger.push(AppliedMigration {
            filename: filename.to_string(),
            applied_at: Utc::now(),
            checksum,
        });
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub fn ledger_filenames(&self) -> Vec<String> {
        self.state().ledger.iter().map(|m| m.filename.clone()).collect()
    }
}

#[async_trait]
impl MigrationBackend for MemoryBackend {
    async fn connect(&self) -> OrmResult<Box<dyn MigrationConnection>> {
        if self.refuse_connections {
            return Err(OrmError::Connection("connection refused".to_string()));
        }
        self.state().connections_opened += 1;
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            fail_on: self.fail_on.clone(),
            recorded_elsewhere: self.recorded_elsewhere.clone(),
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
    fail_on: Option<String>,
    recorded_elsewhere: Option<String>,
}

#[async_trait]
impl MigrationConnection for MemoryConnection {
    async fn execute(&mut self, sql: &str, _params: &[&str]) -> OrmResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(sql.to_string());

        if sql.contains("pg_advisory_lock(") {
            assert!(!state.lock_held, "migration lock taken twice");
            state.lock_held = true;
            state.lock_acquisitions += 1;
        } else if sql.contains("pg_advisory_unlock(") {
            state.lock_held = false;
        } else if sql.starts_with("CREATE TABLE IF NOT EXISTS") {
            state.table_created = true;
        }
        Ok(0)
    }

    async fn fetch_applied(&mut self, sql: &str) -> OrmResult<Vec<AppliedMigration>> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(sql.to_string());
        let mut rows = state.ledger.clone();
        rows.sort_by(|a, b| a.filename.cmp(&b.filename));

        if let Some(filename) = self.recorded_elsewhere.take() {
            state.ledger.push(AppliedMigration {
                filename,
                applied_at: Utc::now(),
                checksum: None,
            });
        }
        Ok(rows)
    }

    async fn table_exists(&mut self, _schema: &str, _table: &str) -> OrmResult<bool> {
        Ok(self.state.lock().unwrap().table_created)
    }

    async fn begin_transaction<'a>(
        &'a mut self,
    ) -> OrmResult<Box<dyn MigrationTransaction + 'a>> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            fail_on: self.fail_on.clone(),
            batches: Vec::new(),
            records: Vec::new(),
        }))
    }

    async fn close(self: Box<Self>) -> OrmResult<()> {
        self.state.lock().unwrap().connections_closed += 1;
        Ok(())
    }
}

struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    fail_on: Option<String>,
    batches: Vec<String>,
    records: Vec<(String, String)>,
}

#[async_trait]
impl MigrationTransaction for MemoryTransaction {
    async fn execute_batch(&mut self, sql: &str) -> OrmResult<()> {
        self.state
            .lock()
            .unwrap()
            .attempted_batches
            .push(sql.to_string());

        if let Some(marker) = &self.fail_on {
            if sql.contains(marker.as_str()) {
                return Err(OrmError::Database(format!(
                    "syntax error at or near \"{}\"",
                    marker
                )));
            }
        }
        self.batches.push(sql.to_string());
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[&str]) -> OrmResult<u64> {
        assert!(sql.starts_with("INSERT INTO"), "unexpected statement: {}", sql);
        let filename = params[0].to_string();

        let duplicate = self
            .state
            .lock()
            .unwrap()
            .ledger
            .iter()
            .any(|m| m.filename == filename);
        if duplicate {
            return Err(OrmError::Database(format!(
                "duplicate key value violates unique constraint: {}",
                filename
            )));
        }

        self.records.push((filename, params[1].to_string()));
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> OrmResult<()> {
        let this = *self;
        let mut state = this.state.lock().unwrap();
        state.committed_batches.extend(this.batches);
        for (filename, checksum) in this.records {
            state.ledger.push(AppliedMigration {
                filename,
                applied_at: Utc::now(),
                checksum: Some(checksum),
            });
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> OrmResult<()> {
        self.state.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}

/// Write migration files into `dir`
pub fn write_migrations(dir: &Path, files: &[(&str, &str)]) {
    fs::create_dir_all(dir).unwrap();
    for (name, body) in files {
        fs::write(dir.join(name), body).unwrap();
    }
}
