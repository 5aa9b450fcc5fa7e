/// Per-roadmap lease lock.
///
/// At most one normalization pass may hold a roadmap's lease at a time, across every
/// process sharing the application database. Leases carry:
/// - **a fresh token per acquisition**: release deletes the row only while the token
///   still matches, so a holder whose lease expired cannot release its successor's lease
/// - **a TTL**: a crashed holder's lease lapses on its own and can be taken over
///
/// Acquisition is a busy-retry loop at a fixed interval with no backoff growth; the
/// wait is bounded by the current holder's lease.
///
/// Two implementations share the [`LeaseLock`] trait: [`SqliteLeaseLock`] for
/// production and [`InMemoryLeaseLock`] for tests and single-process embedding.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use crate::roadmap::database::is_busy;

/// Lock key for a roadmap's normalization lease
pub fn roadmap_lock_key(roadmap_id: &str) -> String {
    format!("lock:roadmap:{roadmap_id}")
}

/// A held lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub key: String,
    /// Unique per acquisition
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    fn mint(key: &str, ttl: Duration) -> Self {
        Self {
            key: key.to_string(),
            token: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(15)),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Lease-based mutual exclusion keyed by string
#[async_trait]
pub trait LeaseLock: Send + Sync {
    /// Take the lease if it is free or expired; `None` while someone else holds it
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<Lease>>;

    /// Release the lease if it still carries `lease.token`.
    ///
    /// Returns `false` when the lease had already lapsed (and possibly been re-acquired).
    async fn release(&self, lease: &Lease) -> Result<bool>;

    /// Drop expired lease records, returning how many were removed
    async fn purge_expired(&self) -> Result<u64>;
}

/// Acquire `key`, retrying every `retry_interval` until the lease is ours.
///
/// Contention is not an error; only backend failures are returned.
pub async fn acquire(lock: &dyn LeaseLock, key: &str, ttl: Duration, retry_interval: Duration) -> Result<Lease> {
    let mut attempts: u64 = 0;
    loop {
        if let Some(lease) = lock.try_acquire(key, ttl).await? {
            if attempts > 0 {
                tracing::debug!("🔓 Acquired {} after {} retries", key, attempts);
            }
            return Ok(lease);
        }
        attempts += 1;
        tokio::time::sleep(retry_interval).await;
    }
}

/// Lease rows in the shared application database
#[derive(Debug, Clone)]
pub struct SqliteLeaseLock {
    pool: SqlitePool,
}

impl SqliteLeaseLock {
    /// The pool must point at a database whose schema includes `roadmap_locks`
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaseLock for SqliteLeaseLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<Lease>> {
        let lease = Lease::mint(key, ttl);
        let now_ms = Utc::now().timestamp_millis();

        // Single statement: insert when free, take over only when the old lease lapsed
        let result = sqlx::query(
            r#"
            INSERT INTO roadmap_locks (lock_key, token, expires_at_ms)
            VALUES (?, ?, ?)
            ON CONFLICT(lock_key) DO UPDATE SET
                token = excluded.token,
                expires_at_ms = excluded.expires_at_ms
            WHERE roadmap_locks.expires_at_ms <= ?
            "#,
        )
        .bind(&lease.key)
        .bind(&lease.token)
        .bind(lease.expires_at.timestamp_millis())
        .bind(now_ms)
        .execute(&self.pool)
        .await;

        match result {
            Ok(result) => Ok((result.rows_affected() == 1).then_some(lease)),
            // another writer held the database past the busy timeout: contention, retry later
            Err(e) if is_busy(&e) => {
                tracing::debug!("⏳ Lease table busy while acquiring {}: {}", key, e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn release(&self, lease: &Lease) -> Result<bool> {
        let result = sqlx::query("DELETE FROM roadmap_locks WHERE lock_key = ? AND token = ?")
            .bind(&lease.key)
            .bind(&lease.token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM roadmap_locks WHERE expires_at_ms <= ?")
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// In-process lease table
///
/// No cross-process coordination; state is lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryLeaseLock {
    leases: Mutex<HashMap<String, Lease>>,
}

fn poison_err<T>(_: PoisonError<T>) -> anyhow::Error {
    anyhow::anyhow!("lease table lock poisoned")
}

impl InMemoryLeaseLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current unexpired holder token of `key`
    pub fn holder(&self, key: &str) -> Result<Option<String>> {
        let leases = self.leases.lock().map_err(poison_err)?;
        Ok(leases
            .get(key)
            .filter(|lease| !lease.is_expired())
            .map(|lease| lease.token.clone()))
    }
}

#[async_trait]
impl LeaseLock for InMemoryLeaseLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<Lease>> {
        let mut leases = self.leases.lock().map_err(poison_err)?;
        if leases.get(key).is_some_and(|held| !held.is_expired()) {
            return Ok(None);
        }
        let lease = Lease::mint(key, ttl);
        leases.insert(key.to_string(), lease.clone());
        Ok(Some(lease))
    }

    async fn release(&self, lease: &Lease) -> Result<bool> {
        let mut leases = self.leases.lock().map_err(poison_err)?;
        match leases.get(&lease.key) {
            Some(held) if held.token == lease.token => {
                leases.remove(&lease.key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self) -> Result<u64> {
        let mut leases = self.leases.lock().map_err(poison_err)?;
        let before = leases.len();
        leases.retain(|_, lease| !lease.is_expired());
        Ok((before - leases.len()) as u64)
    }
}
