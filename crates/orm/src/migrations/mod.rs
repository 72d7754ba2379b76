//! Migration System
//!
//! File-based SQL migrations tracked in a per-schema ledger table.

pub mod checksum;
pub mod definitions;
pub mod manager;
pub mod rewrite;
pub mod runner;

pub use checksum::checksum;
pub use definitions::*;
pub use manager::MigrationManager;
pub use rewrite::{SchemaRewriter, SCHEMA_PLACEHOLDER};
pub use runner::MigrationRunner;
