//! # showroom-orm
//!
//! Schema migrations for the showroom database: discovery of ordered `.sql`
//! files, schema rewriting, a per-schema ledger table, and a runner that
//! applies each pending file in its own transaction under an advisory lock.

pub mod backends;
pub mod error;
pub mod migrations;

pub use backends::{MigrationBackend, MigrationConnection, MigrationTransaction, PostgresBackend};
pub use error::{OrmError, OrmResult};
pub use migrations::{
    AppliedMigration, MigrationConfig, MigrationFile, MigrationManager, MigrationRunResult,
    MigrationRunner, MigrationStatus, MigrationStatusEntry, RunOptions,
};
