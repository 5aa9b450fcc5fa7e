/// Queue worker: consumes durable normalization jobs
///
/// Runs in the `skillstack worker` process. Each job is claimed, executed through the
/// normalization engine (which takes the roadmap's lease), then acked. Failed passes are
/// nacked for retry; jobs with an unknown name are parked immediately.

use crate::runtime::{
    engine::NormalizationEngine,
    queue::{ClaimedJob, JobQueue, NackOutcome, NORMALIZE_JOB},
};
use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;

/// What happened to one claimed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { roadmap_id: String, changed: usize },
    Retrying { roadmap_id: String },
    Failed { job_id: i64 },
}

pub struct QueueWorker {
    queue: Arc<JobQueue>,
    engine: Arc<NormalizationEngine>,
    poll_interval: Duration,
}

impl QueueWorker {
    pub fn new(queue: Arc<JobQueue>, engine: Arc<NormalizationEngine>, poll_interval: Duration) -> Self {
        Self {
            queue,
            engine,
            poll_interval,
        }
    }

    /// Poll until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!("👷 Queue worker started (poll every {:?})", self.poll_interval);

        while !*shutdown.borrow() {
            match self.process_next().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => tracing::error!("❌ Queue worker iteration failed: {:#}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("⏹️ Queue worker stopped");
        Ok(())
    }

    /// Claim and execute at most one job; `None` when the queue had nothing available
    pub async fn process_next(&self) -> Result<Option<JobOutcome>> {
        let Some(job) = self.queue.claim().await? else {
            return Ok(None);
        };

        tracing::debug!(
            "📥 Claimed job {} ({} {}) attempt {}",
            job.id,
            job.job_name,
            job.argument,
            job.attempts
        );

        if job.job_name != NORMALIZE_JOB {
            tracing::error!("❌ Unknown job '{}' (id {}), parking it", job.job_name, job.id);
            self.queue.fail(&job, &format!("unknown job name: {}", job.job_name)).await?;
            return Ok(Some(JobOutcome::Failed { job_id: job.id }));
        }

        self.run_normalization(job).await.map(Some)
    }

    async fn run_normalization(&self, job: ClaimedJob) -> Result<JobOutcome> {
        match self.engine.normalize(&job.argument).await {
            Ok(report) => {
                if !self.queue.ack(&job).await? {
                    tracing::warn!("⚠️ Job {} was reclaimed before its ack landed", job.id);
                }
                tracing::info!(
                    "✅ Normalized roadmap {} via queue ({} of {} steps moved)",
                    job.argument,
                    report.changed,
                    report.steps
                );
                Ok(JobOutcome::Completed {
                    roadmap_id: job.argument,
                    changed: report.changed,
                })
            }
            Err(e) => {
                let error = format!("{e:#}");
                match self.queue.nack(&job, &error).await? {
                    NackOutcome::Retrying => {
                        tracing::warn!(
                            "⚠️ Normalization of roadmap {} failed (attempt {}), will retry: {}",
                            job.argument,
                            job.attempts,
                            error
                        );
                        Ok(JobOutcome::Retrying {
                            roadmap_id: job.argument,
                        })
                    }
                    NackOutcome::Failed => {
                        tracing::error!(
                            "❌ Normalization of roadmap {} failed after {} attempts: {}",
                            job.argument,
                            job.attempts,
                            error
                        );
                        Ok(JobOutcome::Failed { job_id: job.id })
                    }
                }
            }
        }
    }
}
