//! Database module for persistent storage.
//!
//! Provides async SQLite database access using SQLx for blocklist lookup
//! results (`ip_details`), one row per IP address.

mod records;

pub use records::{Record, RecordRepository};

use parking_lot::Mutex;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Connection, SqliteConnection, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
    #[error("migration error: {0}")]
    Migration(sqlx::migrate::MigrateError),
    #[error("no record for ip address: {0}")]
    RecordNotFound(String),
}

/// Database handle with connection pool.
///
/// Cheap to clone; every clone shares the same pool. Closing any clone
/// closes the pool for all of them.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    /// Open for the lifetime of an in-memory store. A shared-cache memory
    /// database is dropped when its last connection closes, and the pool
    /// reaps idle connections.
    keepalive: Option<Arc<Mutex<Option<SqliteConnection>>>>,
}

impl Database {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open the store at `path`, running migrations if needed.
    ///
    /// `":memory:"` opens a private in-memory database.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        Self::open(path, Self::IDLE_TIMEOUT).await
    }

    async fn open(path: &str, idle_timeout: Duration) -> Result<Self, DbError> {
        let (pool, keepalive) = if path == ":memory:" {
            // Each call gets its own named shared-cache database so parallel
            // tests never see each other's rows.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:dnsbl-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true)
                .synchronous(SqliteSynchronous::Normal);

            let keepalive = SqliteConnection::connect_with(&options).await?;

            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(idle_timeout))
                .test_before_acquire(true)
                .connect_with(options)
                .await?;

            (pool, Some(Arc::new(Mutex::new(Some(keepalive)))))
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            // WAL lets lookups read while the worker writes. Set on the
            // options so every pooled connection gets the same pragmas.
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .busy_timeout(Self::ACQUIRE_TIMEOUT);

            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(idle_timeout))
                .test_before_acquire(true)
                .connect_with(options)
                .await?;

            (pool, None)
        };

        info!(path = %path, "Database connected");

        Self::run_migrations(&pool).await?;

        let integrity_result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&pool)
            .await?;

        if integrity_result != "ok" {
            tracing::error!(
                integrity_check = %integrity_result,
                "Database integrity check FAILED - corruption detected!"
            );
            return Err(DbError::Sqlx(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Database integrity check failed: {}", integrity_result),
            ))));
        }

        Ok(Self { pool, keepalive })
    }

    /// Run embedded migrations.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(DbError::Migration)?;

        info!("Database migrations checked/applied");
        Ok(())
    }

    /// Get record repository.
    pub fn records(&self) -> RecordRepository<'_> {
        RecordRepository::new(&self.pool)
    }

    /// Cheap connectivity check used by the readiness probe.
    pub async fn ping(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;

        let conn = self.keepalive.as_ref().and_then(|k| k.lock().take());
        if let Some(conn) = conn
            && let Err(e) = conn.close().await
        {
            tracing::warn!(error = %e, "Failed to close in-memory keepalive connection");
        }

        info!("Database closed");
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::Sqlx(err)
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(err)
    }
}
