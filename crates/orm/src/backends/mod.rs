//! Database Backends
//!
//! Backend traits used by the migration runner and their PostgreSQL
//! implementation.

pub mod core;
pub mod postgres;

pub use self::core::*;
pub use self::postgres::{PostgresBackend, PostgresConnection, PostgresTransaction};
