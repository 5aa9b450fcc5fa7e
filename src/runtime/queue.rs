/// Durable job queue for out-of-process normalization.
///
/// Jobs are rows in their own SQLite database: a job name plus one string argument
/// (the roadmap id). Delivery is at-least-once with acks-late:
/// - [`JobQueue::claim`] flips the oldest available row to `running` and hides it for
///   the visibility timeout
/// - [`JobQueue::ack`] deletes the row once the pass finished
/// - [`JobQueue::nack`] re-queues with a delay until `max_attempts`, then parks the row
///   as `failed`
/// - [`JobQueue::reclaim_stalled`] returns rows whose worker vanished to the queue
///
/// The pool is opened lazily so an unreachable queue shows up at enqueue time, where the
/// scheduler can fall back to in-process execution.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::sync::OnceCell;

use crate::config::NormalizationConfig;

/// Job name of a normalization pass; its argument is the roadmap id
pub const NORMALIZE_JOB: &str = "normalize_roadmap_steps";

/// Retry and visibility policy
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub visibility_timeout: Duration,
}

impl From<&NormalizationConfig> for QueueSettings {
    fn from(config: &NormalizationConfig) -> Self {
        Self {
            max_attempts: config.job_max_attempts.max(1),
            retry_delay: config.job_retry_delay,
            visibility_timeout: config.job_visibility_timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueResult {
    Enqueued { job_id: i64 },
    /// A queued job with the same name and argument already exists
    Coalesced,
}

/// A job claimed by a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    pub id: i64,
    pub job_name: String,
    pub argument: String,
    /// Delivery attempts including this one
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    Retrying,
    Failed,
}

/// Row counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub queued: i64,
    pub running: i64,
    pub failed: i64,
}

#[derive(Debug)]
pub struct JobQueue {
    pool: SqlitePool,
    schema: OnceCell<()>,
    settings: QueueSettings,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

impl JobQueue {
    /// Point at the queue database without connecting.
    ///
    /// The file is created on first use when its directory exists; nothing else is
    /// created, so a missing mount or directory surfaces as an enqueue failure.
    pub fn open_lazy(path: impl AsRef<Path>, settings: QueueSettings) -> Self {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(3))
            .connect_lazy_with(options);

        Self {
            pool,
            schema: OnceCell::new(),
            settings,
        }
    }

    /// Create the jobs table on first use
    async fn ensure_schema(&self) -> Result<()> {
        self.schema
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS normalization_jobs (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        job_name TEXT NOT NULL,
                        argument TEXT NOT NULL,
                        status TEXT NOT NULL DEFAULT 'queued',
                        attempts INTEGER NOT NULL DEFAULT 0,
                        available_at_ms INTEGER NOT NULL,
                        claimed_until_ms INTEGER,
                        last_error TEXT,
                        enqueued_at TEXT NOT NULL
                    )
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    "CREATE INDEX IF NOT EXISTS idx_jobs_claim ON normalization_jobs(status, available_at_ms, id)",
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), anyhow::Error>(())
            })
            .await
            .context("initialize job queue schema")?;
        Ok(())
    }

    /// Add a job unless an identical one is still waiting
    pub async fn enqueue(&self, job_name: &str, argument: &str) -> Result<EnqueueResult> {
        self.ensure_schema().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO normalization_jobs (job_name, argument, status, attempts, available_at_ms, enqueued_at)
            SELECT ?, ?, 'queued', 0, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM normalization_jobs
                WHERE job_name = ? AND argument = ? AND status = 'queued'
            )
            "#,
        )
        .bind(job_name)
        .bind(argument)
        .bind(now_ms())
        .bind(Utc::now().to_rfc3339())
        .bind(job_name)
        .bind(argument)
        .execute(&self.pool)
        .await
        .context("insert queue job")?;

        if result.rows_affected() == 0 {
            Ok(EnqueueResult::Coalesced)
        } else {
            Ok(EnqueueResult::Enqueued {
                job_id: result.last_insert_rowid(),
            })
        }
    }

    /// Claim the oldest available job, hiding it for the visibility timeout
    pub async fn claim(&self) -> Result<Option<ClaimedJob>> {
        self.ensure_schema().await?;
        let now = now_ms();

        let row = sqlx::query(
            r#"
            UPDATE normalization_jobs
            SET status = 'running', attempts = attempts + 1, claimed_until_ms = ?
            WHERE id = (
                SELECT id FROM normalization_jobs
                WHERE status = 'queued' AND available_at_ms <= ?
                ORDER BY id ASC
                LIMIT 1
            )
            RETURNING id, job_name, argument, attempts
            "#,
        )
        .bind(now + millis(self.settings.visibility_timeout))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ClaimedJob {
            id: row.get("id"),
            job_name: row.get("job_name"),
            argument: row.get("argument"),
            attempts: u32::try_from(row.get::<i64, _>("attempts")).unwrap_or(u32::MAX),
        }))
    }

    /// Finish a job; returns `false` if the claim had already been reclaimed
    pub async fn ack(&self, job: &ClaimedJob) -> Result<bool> {
        let result = sqlx::query("DELETE FROM normalization_jobs WHERE id = ? AND status = 'running'")
            .bind(job.id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Report a failed attempt: retry later, or park the job once attempts run out
    pub async fn nack(&self, job: &ClaimedJob, error: &str) -> Result<NackOutcome> {
        if job.attempts >= self.settings.max_attempts {
            self.fail(job, error).await?;
            return Ok(NackOutcome::Failed);
        }

        sqlx::query(
            r#"
            UPDATE normalization_jobs
            SET status = 'queued', available_at_ms = ?, claimed_until_ms = NULL, last_error = ?
            WHERE id = ?
            "#,
        )
        .bind(now_ms() + millis(self.settings.retry_delay))
        .bind(error)
        .bind(job.id)
        .execute(&self.pool)
        .await?;
        Ok(NackOutcome::Retrying)
    }

    /// Park a job as failed without further retries
    pub async fn fail(&self, job: &ClaimedJob, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE normalization_jobs SET status = 'failed', claimed_until_ms = NULL, last_error = ? WHERE id = ?",
        )
        .bind(error)
        .bind(job.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Return jobs whose claim lapsed to the queue; exhausted ones are parked instead.
    ///
    /// Returns the number of re-queued jobs.
    pub async fn reclaim_stalled(&self) -> Result<u64> {
        self.ensure_schema().await?;
        let now = now_ms();

        sqlx::query(
            r#"
            UPDATE normalization_jobs
            SET status = 'failed', claimed_until_ms = NULL, last_error = 'claim expired after final attempt'
            WHERE status = 'running' AND claimed_until_ms <= ? AND attempts >= ?
            "#,
        )
        .bind(now)
        .bind(i64::from(self.settings.max_attempts))
        .execute(&self.pool)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE normalization_jobs
            SET status = 'queued', claimed_until_ms = NULL, available_at_ms = ?
            WHERE status = 'running' AND claimed_until_ms <= ?
            "#,
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn counts(&self) -> Result<QueueCounts> {
        self.ensure_schema().await?;
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM normalization_jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let n: i64 = row.get("n");
            match row.get::<String, _>("status").as_str() {
                "queued" => counts.queued = n,
                "running" => counts.running = n,
                "failed" => counts.failed = n,
                _ => {}
            }
        }
        Ok(counts)
    }
}
