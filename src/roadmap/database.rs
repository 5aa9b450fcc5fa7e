/// Application database setup
///
/// Opens the SQLite pool that holds roadmaps, steps, and lease rows, and creates the
/// schema idempotently. Every process (API server and queue workers) opens the same
/// file, which is what makes the lease lock cross-process.

use anyhow::{Context, Result};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Transaction;
use std::path::Path;
use std::time::Duration;

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Start a transaction that holds the write lock from its first statement.
///
/// Read-then-write transactions must use this: a deferred transaction that upgrades to
/// a writer after another connection committed fails with SQLITE_BUSY immediately,
/// while `BEGIN IMMEDIATE` waits under the busy timeout.
pub async fn begin_write(pool: &SqlitePool) -> sqlx::Result<Transaction<'static, Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

/// SQLITE_BUSY or SQLITE_LOCKED, including their extended codes
pub fn is_busy(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| matches!(code & 0xff, 5 | 6))
}

/// Shared handle to the application database
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database at `path` and initialize its schema
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!("Failed to create database directory '{}': {}", parent.display(), e)
            })?;
        }

        tracing::info!("🗄️ Opening application database: {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .with_context(|| format!("connect to {}", path.display()))?;

        let db = Self { pool };
        db.init_schema().await?;

        tracing::info!("✅ Application database ready: {}", path.display());
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables for roadmaps, steps, and lease rows
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS roadmaps (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                is_public INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // seq is the insertion order used to break position ties
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS roadmap_steps (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                roadmap_id TEXT NOT NULL REFERENCES roadmaps(id) ON DELETE CASCADE,
                title TEXT NOT NULL DEFAULT 'Untitled Step',
                description TEXT,
                position INTEGER NOT NULL DEFAULT 0,
                estimated_hours REAL,
                resources TEXT,
                note TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS roadmap_locks (
                lock_key TEXT PRIMARY KEY,
                token TEXT NOT NULL,
                expires_at_ms INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_roadmap_steps_order ON roadmap_steps(roadmap_id, position, seq)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_roadmaps_owner ON roadmaps(owner_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
