//! PostgreSQL Backend Implementation
//!
//! This module provides the PostgreSQL implementation of the migration
//! backend traits using sqlx as the underlying database driver.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use showroom_core::{ConnectionTarget, DatabaseConfig};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::{Postgres, Row};

use super::core::*;
use crate::error::{OrmError, OrmResult};
use crate::migrations::definitions::AppliedMigration;

const APPLICATION_NAME: &str = "showroom-migrate";
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// PostgreSQL database backend implementation
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    options: PgConnectOptions,
}

impl PostgresBackend {
    /// Create a backend from prepared connect options
    pub fn new(options: PgConnectOptions) -> Self {
        Self { options }
    }

    /// Create a backend from the resolved database configuration
    pub fn from_config(config: &DatabaseConfig) -> OrmResult<Self> {
        let options = match &config.target {
            ConnectionTarget::Url(url) => {
                validate_database_url(url)?;
                PgConnectOptions::from_str(url).map_err(|e| {
                    OrmError::Configuration(format!("Invalid PostgreSQL URL: {}", e))
                })?
            }
            ConnectionTarget::Params {
                host,
                user,
                password,
                database,
                port,
            } => PgConnectOptions::new()
                .host(host)
                .username(user)
                .password(password)
                .database(database)
                .port(*port),
        };

        // Encrypted without certificate verification, or plain
        let ssl_mode = if config.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Disable
        };

        Ok(Self::new(
            options
                .ssl_mode(ssl_mode)
                .application_name(APPLICATION_NAME),
        ))
    }

}

fn validate_database_url(url: &str) -> OrmResult<()> {
    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
        return Err(OrmError::Configuration(
            "Invalid PostgreSQL URL scheme".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl MigrationBackend for PostgresBackend {
    async fn connect(&self) -> OrmResult<Box<dyn MigrationConnection>> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(self.options.clone())
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to create PostgreSQL pool: {}", e)))?;

        let conn = match pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                pool.close().await;
                return Err(OrmError::Connection(format!(
                    "Failed to acquire database connection: {}",
                    e
                )));
            }
        };

        tracing::debug!("Database connection acquired");
        Ok(Box::new(PostgresConnection { pool, conn }))
    }
}

/// The run's single pooled connection
pub struct PostgresConnection {
    pool: PgPool,
    conn: PoolConnection<Postgres>,
}

#[async_trait]
impl MigrationConnection for PostgresConnection {
    async fn execute(&mut self, sql: &str, params: &[&str]) -> OrmResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(*param);
        }
        let result = query.execute(&mut *self.conn).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_applied(&mut self, sql: &str) -> OrmResult<Vec<AppliedMigration>> {
        let rows = sqlx::query(sql).fetch_all(&mut *self.conn).await?;

        rows.iter()
            .map(|row| -> OrmResult<AppliedMigration> {
                Ok(AppliedMigration {
                    filename: row.try_get("filename")?,
                    applied_at: row.try_get("applied_at")?,
                    checksum: row.try_get("checksum")?,
                })
            })
            .collect()
    }

    async fn table_exists(&mut self, schema: &str, table: &str) -> OrmResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = $1 AND table_name = $2)",
        )
        .bind(schema)
        .bind(table)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(row.try_get::<bool, _>(0)?)
    }

    async fn begin_transaction<'a>(
        &'a mut self,
    ) -> OrmResult<Box<dyn MigrationTransaction + 'a>> {
        let tx = sqlx::Connection::begin(&mut *self.conn)
            .await
            .map_err(|e| OrmError::Transaction(format!("Failed to start transaction: {}", e)))?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn close(self: Box<Self>) -> OrmResult<()> {
        let PostgresConnection { pool, conn } = *self;
        drop(conn);
        pool.close().await;
        tracing::debug!("Database pool closed");
        Ok(())
    }
}

/// PostgreSQL transaction implementation
pub struct PostgresTransaction<'c> {
    tx: sqlx::Transaction<'c, Postgres>,
}

#[async_trait]
impl<'c> MigrationTransaction for PostgresTransaction<'c> {
    async fn execute_batch(&mut self, sql: &str) -> OrmResult<()> {
        // A bare &str carries no arguments, so sqlx sends it over the simple
        // query protocol and multi-statement bodies are accepted.
        sqlx::Executor::execute(&mut *self.tx, sql).await?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[&str]) -> OrmResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(*param);
        }
        let result = query.execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> OrmResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| OrmError::Transaction(format!("Failed to commit transaction: {}", e)))
    }

    async fn rollback(self: Box<Self>) -> OrmResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| OrmError::Transaction(format!("Failed to rollback transaction: {}", e)))
    }
}
