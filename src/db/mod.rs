//! # Database Module
//!
//! This module handles all database operations for the coin ledger.
//! PostgreSQL stores:
//!
//! - Account records (balance, lifetime earned/spent counters)
//! - Project funding records (goal, running total, status)
//! - The transaction log (every value movement, with status lifecycle)
//! - Reconciliation logs (auditing)
//!
//! ## Why Postgres here
//!
//! The ledger's correctness rests on single-statement conditional
//! updates (`UPDATE ... WHERE balance >= amount RETURNING ...`) and on
//! wrapping multi-row movements in one transaction. Both are native to
//! Postgres; see [`queries`] for the discipline.
//!
//! The `Database` handle is constructed once at startup and passed
//! explicitly to every service - no process-wide singleton.

pub mod models;
pub mod queries;

use deadpool_postgres::{Config, Pool, Runtime};
use thiserror::Error;
use tokio_postgres::{Config as TokioConfig, NoTls};
use tracing::{info, warn};

/// Database-related errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to connect to the database
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryError(#[from] tokio_postgres::Error),

    /// Migration failed
    #[error("Migration failed: {0}")]
    MigrationError(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// Schema applied by [`Database::run_migrations`].
const INITIAL_SCHEMA: &str = include_str!("../../migrations/001_initial_schema.sql");

/// Database connection wrapper.
///
/// Wraps the deadpool connection pool and provides startup helpers.
/// Cloning is cheap (the pool is internally shared).
#[derive(Clone)]
pub struct Database {
    /// The connection pool
    pool: Pool,
}

impl Database {
    /// Connect to the PostgreSQL database.
    ///
    /// Creates a connection pool (max 10 connections) and verifies it
    /// with a trivial query before returning.
    pub async fn connect(database_url: &str) -> Result<Self, DatabaseError> {
        info!("Connecting to database...");

        let tokio_config = database_url
            .parse::<TokioConfig>()
            .map_err(|e| DatabaseError::ConfigError(format!("Invalid database URL: {}", e)))?;

        let mut config = Config::new();

        if let Some(dbname) = tokio_config.get_dbname() {
            config.dbname = Some(dbname.to_string());
        }
        if let Some(user) = tokio_config.get_user() {
            config.user = Some(user.to_string());
        }
        if let Some(password) = tokio_config.get_password() {
            config.password = Some(String::from_utf8_lossy(password).to_string());
        }
        if let Some(tokio_postgres::config::Host::Tcp(host)) = tokio_config.get_hosts().first() {
            config.host = Some(host.clone());
        }
        if let Some(port) = tokio_config.get_ports().first() {
            config.port = Some(*port);
        }

        config.pool = Some(deadpool_postgres::PoolConfig {
            max_size: 10,
            ..Default::default()
        });

        let pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;
        client
            .query("SELECT 1", &[])
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Apply the schema.
    ///
    /// The migration SQL is compiled into the binary and written with
    /// `IF NOT EXISTS` guards, so re-running it is harmless. Duplicate
    /// object errors from older Postgres versions are tolerated.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        info!("Running database migrations...");

        let client = self
            .pool
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        match client.batch_execute(INITIAL_SCHEMA).await {
            Ok(_) => {
                info!("Migrations completed");
                Ok(())
            }
            Err(e) => {
                // 42P07 = duplicate_table, 42710 = duplicate_object
                let duplicate = e
                    .code()
                    .map(|c| c.code() == "42P07" || c.code() == "42710")
                    .unwrap_or(false);

                if duplicate {
                    warn!("Schema objects already exist, continuing");
                    Ok(())
                } else {
                    Err(DatabaseError::MigrationError(e.to_string()))
                }
            }
        }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

// Re-export commonly used items
pub use models::*;
