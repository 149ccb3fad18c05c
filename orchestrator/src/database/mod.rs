//! Database layer for the orchestrator.
//!
//! This module provides SQLite persistence for:
//! - Health records (one row per HealthMonitor poll)
//! - Unit configuration overrides applied through the control plane
//!
//! The module is organized into submodules:
//! - `records` - All record types (entities)
//! - `health` - Health history operations
//! - `config` - Unit configuration overrides

mod config;
mod health;
mod records;

pub use records::*;

use anyhow::{anyhow, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;
use tracing::{error, info};

use crate::errors::DatabaseError;

pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Expose pool for integration test queries
    #[allow(dead_code)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn new(database_path: &str) -> Result<Self> {
        info!("Opening database at {}", database_path);

        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("Failed to create database directory {:?}: {}", parent, e)
                })?;
            }
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path);
        let pool = SqlitePool::connect(&database_url).await.map_err(|e| {
            error!("Failed to connect to database {}: {}", database_url, e);
            DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            }
        })?;

        let database = Self { pool };
        database.initialize_tables().await?;
        info!("✓ Database ready");
        Ok(database)
    }

    /// Private in-memory database, used by tests and dry runs
    pub async fn in_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database, so keep exactly one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        let database = Self { pool };
        database.initialize_tables().await?;
        Ok(database)
    }

    async fn initialize_tables(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS health_records (
                id TEXT PRIMARY KEY,
                timestamp DATETIME NOT NULL,
                total INTEGER NOT NULL,
                active INTEGER NOT NULL,
                error_count INTEGER NOT NULL,
                problems TEXT NOT NULL,
                metrics TEXT NOT NULL,
                services TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_health_timestamp ON health_records(timestamp DESC)",
            r#"
            CREATE TABLE IF NOT EXISTS unit_config (
                unit_name TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at DATETIME NOT NULL,
                PRIMARY KEY (unit_name, key)
            )
            "#,
        ];

        for sql in statements {
            if let Err(e) = sqlx::query(sql).execute(&self.pool).await {
                error!("Failed to initialize schema: {}", e);
                return Err(DatabaseError::QueryFailed {
                    query: sql.trim().lines().next().unwrap_or_default().to_string(),
                    reason: e.to_string(),
                }
                .into());
            }
        }

        info!("Database tables initialized");
        Ok(())
    }
}

pub(crate) fn query_failed(query: &str, e: sqlx::Error) -> DatabaseError {
    DatabaseError::QueryFailed {
        query: query.to_string(),
        reason: e.to_string(),
    }
}

pub(crate) fn serialization_failed(e: serde_json::Error) -> DatabaseError {
    DatabaseError::SerializationError {
        reason: e.to_string(),
    }
}
