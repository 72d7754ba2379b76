//! Core Database Backend Traits
//!
//! The migration runner only talks to the database through these traits. A
//! backend hands out one connection per run; everything the runner does,
//! locking included, happens on that connection.

use async_trait::async_trait;

use crate::error::OrmResult;
use crate::migrations::definitions::AppliedMigration;

/// Opens connections for a migration run
#[async_trait]
pub trait MigrationBackend: Send + Sync {
    /// Open a fresh pool and acquire its single connection
    async fn connect(&self) -> OrmResult<Box<dyn MigrationConnection>>;
}

/// A dedicated connection used for the whole run
#[async_trait]
pub trait MigrationConnection: Send {
    /// Execute a single parametrized statement and return affected rows count
    async fn execute(&mut self, sql: &str, params: &[&str]) -> OrmResult<u64>;

    /// Read ledger rows (`filename`, `applied_at`, `checksum`)
    async fn fetch_applied(&mut self, sql: &str) -> OrmResult<Vec<AppliedMigration>>;

    /// Check whether `schema.table` exists
    async fn table_exists(&mut self, schema: &str, table: &str) -> OrmResult<bool>;

    /// Begin a transaction
    async fn begin_transaction<'a>(&'a mut self)
        -> OrmResult<Box<dyn MigrationTransaction + 'a>>;

    /// Release the connection and close the pool
    async fn close(self: Box<Self>) -> OrmResult<()>;
}

/// Abstract database transaction trait
#[async_trait]
pub trait MigrationTransaction: Send {
    /// Execute raw SQL that may contain several statements
    async fn execute_batch(&mut self, sql: &str) -> OrmResult<()>;

    /// Execute a single parametrized statement within the transaction
    async fn execute(&mut self, sql: &str, params: &[&str]) -> OrmResult<u64>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> OrmResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> OrmResult<()>;
}
