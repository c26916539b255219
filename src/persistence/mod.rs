//! Persistence Layer
//!
//! SQLite storage for tracked predictions, daily execution logs and market
//! calendar overrides, with async access via sqlx.
//!
//! # Database Schema
//!
//! ## prediction_tracking
//! - id: Serial
//! - symbol, prediction_date: natural key, unique together
//! - predicted_price, predicted_direction ("up" | "down" | "hold"), confidence
//! - reference_price: latest close the prediction was made from
//! - actual_close, accuracy_mape, direction_correct: filled by reconciliation
//! - market_was_open, prediction_timestamp, actual_price_timestamp
//! - created_at, updated_at
//!
//! ## daily_execution_log
//! - id: Serial
//! - execution_date, execution_type ("auto" | "manual")
//! - status ("pending" | "running" | "completed" | "failed")
//! - total_symbols, successful_predictions, failed_predictions
//! - symbols_processed, symbols_succeeded, symbols_failed: JSON arrays
//! - duration_ms, error_message, created_at, completed_at
//!
//! ## market_calendar
//! - id: Serial
//! - date, market_type: unique together
//! - is_market_open, holiday_name, created_at

pub mod accuracy_repository;
pub mod calendar_repository;
pub mod execution_log_repository;
pub mod models;
pub mod prediction_repository;

pub use accuracy_repository::AccuracyRepository;
pub use calendar_repository::CalendarRepository;
pub use execution_log_repository::ExecutionLogRepository;
pub use prediction_repository::PredictionRepository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Invalid stored row: {0}")]
    InvalidRow(String),
}

/// Initialize the database connection pool with default settings
///
/// # Arguments
/// - `database_url`: SQLite URL (e.g., "sqlite://data/predictions.db")
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    init_database_with(&DatabaseConfig {
        url: database_url.to_string(),
        ..DatabaseConfig::default()
    })
    .await
}

/// Initialize the database connection pool
///
/// # Errors
/// Returns error if database connection fails or migrations fail
pub async fn init_database_with(config: &DatabaseConfig) -> Result<DbPool, DatabaseError> {
    info!(url = %config.url, "Initializing database");

    // Ensure data directory exists
    if let Some(db_path) = config.url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
                })?;
            }
        }
    }

    let level = if config.log_queries {
        tracing::log::LevelFilter::Debug
    } else {
        tracing::log::LevelFilter::Trace
    };
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .log_statements(level);

    let is_memory = config.url.contains(":memory:");
    let mut pool_options = SqlitePoolOptions::new().max_connections(if is_memory {
        // every connection to ":memory:" opens its own database
        1
    } else {
        config.max_connections.max(1)
    });
    if is_memory {
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }

    let pool = pool_options.connect_with(options).await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");

    Ok(pool)
}

/// Run database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS prediction_tracking (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT NOT NULL,
            prediction_date TEXT NOT NULL,
            predicted_price REAL,
            predicted_direction TEXT CHECK(predicted_direction IN ('up', 'down', 'hold')),
            confidence REAL,
            reference_price REAL,
            actual_close REAL,
            accuracy_mape REAL,
            direction_correct BOOLEAN,
            market_was_open BOOLEAN NOT NULL DEFAULT 1,
            prediction_timestamp TEXT NOT NULL,
            actual_price_timestamp TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(symbol, prediction_date)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create prediction_tracking table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS daily_execution_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            execution_date TEXT NOT NULL,
            execution_type TEXT NOT NULL CHECK(execution_type IN ('auto', 'manual')),
            status TEXT NOT NULL CHECK(status IN ('pending', 'running', 'completed', 'failed')),
            total_symbols INTEGER NOT NULL DEFAULT 0,
            successful_predictions INTEGER NOT NULL DEFAULT 0,
            failed_predictions INTEGER NOT NULL DEFAULT 0,
            symbols_processed TEXT NOT NULL DEFAULT '[]',
            symbols_succeeded TEXT NOT NULL DEFAULT '[]',
            symbols_failed TEXT NOT NULL DEFAULT '[]',
            duration_ms INTEGER,
            error_message TEXT,
            created_at TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create daily_execution_log table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS market_calendar (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            is_market_open BOOLEAN NOT NULL,
            holiday_name TEXT,
            market_type TEXT NOT NULL DEFAULT 'US',
            created_at TEXT NOT NULL,
            UNIQUE(date, market_type)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create market_calendar table: {}", e))
    })?;

    // Create indexes for better query performance
    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_prediction_symbol ON prediction_tracking(symbol)",
        "CREATE INDEX IF NOT EXISTS idx_prediction_date ON prediction_tracking(prediction_date)",
        "CREATE INDEX IF NOT EXISTS idx_execution_date ON daily_execution_log(execution_date)",
        "CREATE INDEX IF NOT EXISTS idx_calendar_date ON market_calendar(date)",
    ] {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;
    }

    info!("Database migrations completed successfully");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/predictions.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Enable query logging
    pub log_queries: bool,
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/predictions.db";

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 5,
            log_queries: cfg!(debug_assertions),
        }
    }
}

impl DatabaseConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let log_queries = std::env::var("DATABASE_LOG_QUERIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(cfg!(debug_assertions));

        Self {
            url,
            max_connections,
            log_queries,
        }
    }
}

/// In-memory database with migrations applied.
#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    init_database("sqlite::memory:").await.unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations() {
        let pool = test_pool().await;

        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('prediction_tracking', 'daily_execution_log', 'market_calendar')"
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(result.0, 3);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();
    }

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.url, "sqlite://data/predictions.db");
        assert_eq!(config.max_connections, 5);
    }
}
