//! Process-wide connection pool and schema.
//!
//! A [`Database`] is opened once at startup, shared by every request, and
//! closed explicitly at shutdown so that in-flight statements drain before
//! the process exits.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Schema scripts in apply order. Each is idempotent.
const SCHEMA: &[(&str, &str)] = &[(
    "20250101000000_create_tasks",
    include_str!("../migrations/20250101000000_create_tasks.sql"),
)];

/// Default number of pooled connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// How long a statement waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while opening the database.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// The database could not be opened or the URL is invalid.
    #[error("failed to open database: {0}")]
    Connect(#[from] sqlx::Error),
    /// Applying a schema script failed.
    #[error("failed to apply schema {name}: {source}")]
    Schema {
        name: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// Handle to the shared connection pool. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if missing) the database at `url` and applies the
    /// schema.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError`] if the URL is invalid, the database cannot
    /// be opened, or the schema cannot be applied.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::from_str(url)?;
        Self::connect_with(options, max_connections).await
    }

    /// Opens the database file at `path`. Convenience for tests and tools.
    ///
    /// # Errors
    ///
    /// See [`Database::connect`].
    pub async fn open(path: &Path) -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::new().filename(path);
        Self::connect_with(options, DEFAULT_MAX_CONNECTIONS).await
    }

    async fn connect_with(
        options: SqliteConnectOptions,
        max_connections: u32,
    ) -> Result<Self, DatabaseError> {
        let options = options
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        for &(name, sql) in SCHEMA {
            sqlx::query(sql)
                .execute(&pool)
                .await
                .map_err(|source| DatabaseError::Schema { name, source })?;
        }
        tracing::info!(max_connections, "database ready");

        Ok(Self { pool })
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Stops handing out connections and waits for checked-out ones to
    /// return.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("database closed");
    }
}
