/// Normalization engine
///
/// Runs one normalization pass for one roadmap: take the roadmap's lease, renumber its
/// steps to 1..N in a single transaction, release the lease. The lease is released on
/// every exit path; a pass that panics or whose process dies is covered by the lease TTL.

use crate::{
    roadmap::positions::{PassOutcome, PositionStore},
    runtime::{
        lock::{self, roadmap_lock_key, LeaseLock},
        metrics,
    },
};
use anyhow::Result;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// Summary of a completed pass
#[derive(Debug, Clone)]
pub struct PassReport {
    pub roadmap_id: String,
    /// Steps the pass saw
    pub steps: usize,
    /// Positions rewritten
    pub changed: usize,
    /// Time spent waiting for the lease
    pub lock_wait: Duration,
    /// Time spent inside the critical section
    pub duration: Duration,
}

/// Lock-guarded normalization over the position store
pub struct NormalizationEngine {
    store: PositionStore,
    lock: Arc<dyn LeaseLock>,
    lease_ttl: Duration,
    retry_interval: Duration,
}

impl std::fmt::Debug for NormalizationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizationEngine")
            .field("lease_ttl", &self.lease_ttl)
            .field("retry_interval", &self.retry_interval)
            .finish_non_exhaustive()
    }
}

impl NormalizationEngine {
    pub fn new(store: PositionStore, lock: Arc<dyn LeaseLock>, lease_ttl: Duration, retry_interval: Duration) -> Self {
        Self {
            store,
            lock,
            lease_ttl,
            retry_interval,
        }
    }

    pub fn store(&self) -> &PositionStore {
        &self.store
    }

    /// Run one pass for `roadmap_id`, waiting for the lease as long as it takes
    pub async fn normalize(&self, roadmap_id: &str) -> Result<PassReport> {
        let key = roadmap_lock_key(roadmap_id);
        let wait_started = Instant::now();
        let lease = lock::acquire(self.lock.as_ref(), &key, self.lease_ttl, self.retry_interval).await?;
        let lock_wait = wait_started.elapsed();

        let started = Instant::now();
        let outcome = self.store.normalize_roadmap(roadmap_id).await;
        let duration = started.elapsed();
        metrics::record_pass(duration);

        match self.lock.release(&lease).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    "⚠️ Lease {} lapsed before release (pass took {:?}, ttl {:?})",
                    key,
                    duration,
                    self.lease_ttl
                );
            }
            Err(e) => {
                tracing::error!("❌ Failed to release lease {}: {}", key, e);
            }
        }

        let PassOutcome { steps, changes } = outcome?;
        Ok(PassReport {
            roadmap_id: roadmap_id.to_string(),
            steps,
            changed: changes.len(),
            lock_wait,
            duration,
        })
    }

    /// Run a pass and log its outcome; used by detached tasks that have nobody to report to
    pub async fn normalize_logged(&self, roadmap_id: &str) {
        match self.normalize(roadmap_id).await {
            Ok(report) if report.changed > 0 => {
                tracing::info!(
                    "✅ Normalized roadmap {} ({} of {} steps moved, waited {:?})",
                    roadmap_id,
                    report.changed,
                    report.steps,
                    report.lock_wait
                );
            }
            Ok(report) => {
                tracing::debug!("📋 Roadmap {} already ordered ({} steps)", roadmap_id, report.steps);
            }
            Err(e) => {
                tracing::error!("❌ Normalization failed for roadmap {}: {:#}", roadmap_id, e);
            }
        }
    }
}
