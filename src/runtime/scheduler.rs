/// Background maintenance scheduler
///
/// Periodic housekeeping using tokio-cron-scheduler:
/// - reclaim queue jobs whose worker vanished and purge lapsed lease rows
/// - optionally sweep every roadmap through the normalization scheduler, catching
///   requests that were dropped while both runners were unavailable

use crate::{
    roadmap::positions::PositionStore,
    runtime::{dispatch::NormalizationScheduler, lock::LeaseLock, queue::JobQueue},
};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// The work each cron tick performs, separated from the cron plumbing
#[derive(Clone)]
pub struct MaintenanceTasks {
    lock: Arc<dyn LeaseLock>,
    queue: Option<Arc<JobQueue>>,
    store: PositionStore,
    scheduler: Option<Arc<NormalizationScheduler>>,
}

/// Counts from one maintenance tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub reclaimed_jobs: u64,
    pub purged_leases: u64,
}

impl MaintenanceTasks {
    /// `scheduler` is needed only by the sweep; worker processes run without one
    pub fn new(
        lock: Arc<dyn LeaseLock>,
        queue: Option<Arc<JobQueue>>,
        store: PositionStore,
        scheduler: Option<Arc<NormalizationScheduler>>,
    ) -> Self {
        Self {
            lock,
            queue,
            store,
            scheduler,
        }
    }

    /// Reclaim stalled jobs and drop lapsed leases
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport> {
        let reclaimed_jobs = match &self.queue {
            Some(queue) => queue.reclaim_stalled().await?,
            None => 0,
        };
        let purged_leases = self.lock.purge_expired().await?;

        if reclaimed_jobs > 0 {
            tracing::warn!("♻️ Reclaimed {} stalled normalization jobs", reclaimed_jobs);
        }
        tracing::debug!("🧹 Purged {} lapsed leases", purged_leases);

        Ok(MaintenanceReport {
            reclaimed_jobs,
            purged_leases,
        })
    }

    /// Enqueue a pass for every roadmap; returns how many were requested
    pub async fn run_sweep(&self) -> Result<usize> {
        let Some(scheduler) = &self.scheduler else {
            return Ok(0);
        };

        let roadmap_ids = self.store.roadmap_ids().await?;
        for roadmap_id in &roadmap_ids {
            scheduler.dispatch(roadmap_id).await;
        }

        tracing::info!("🔁 Sweep requested normalization for {} roadmaps", roadmap_ids.len());
        Ok(roadmap_ids.len())
    }
}

/// Cron-driven runner for [`MaintenanceTasks`]
pub struct MaintenanceScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    job_ids: RwLock<Vec<Uuid>>,
    tasks: MaintenanceTasks,
    maintenance_schedule: String,
    sweep_schedule: Option<String>,
}

impl MaintenanceScheduler {
    pub async fn new(
        tasks: MaintenanceTasks,
        maintenance_schedule: impl Into<String>,
        sweep_schedule: Option<String>,
    ) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            job_ids: RwLock::new(Vec::new()),
            tasks,
            maintenance_schedule: maintenance_schedule.into(),
            sweep_schedule,
        })
    }

    /// Register the cron jobs and start ticking
    pub async fn start(&self) -> Result<()> {
        tracing::info!("⏰ Starting maintenance scheduler ({})", self.maintenance_schedule);

        let tasks = self.tasks.clone();
        let maintenance = Job::new_async(self.maintenance_schedule.as_str(), move |_uuid, _l| {
            let tasks = tasks.clone();
            Box::pin(async move {
                if let Err(e) = tasks.run_maintenance().await {
                    tracing::error!("❌ Maintenance tick failed: {:#}", e);
                }
            })
        })?;
        self.register(maintenance).await?;

        if let Some(schedule) = &self.sweep_schedule {
            let tasks = self.tasks.clone();
            let sweep = Job::new_async(schedule.as_str(), move |_uuid, _l| {
                let tasks = tasks.clone();
                Box::pin(async move {
                    if let Err(e) = tasks.run_sweep().await {
                        tracing::error!("❌ Normalization sweep failed: {:#}", e);
                    }
                })
            })?;
            self.register(sweep).await?;
            tracing::info!("🔁 Normalization sweep scheduled ({})", schedule);
        }

        {
            let scheduler = self.scheduler.read().await;
            scheduler.start().await?;
        }

        tracing::info!("✅ Maintenance scheduler started");
        Ok(())
    }

    /// Remove registered jobs and shut the scheduler down
    pub async fn stop(&self) -> Result<()> {
        tracing::info!("⏹️ Stopping maintenance scheduler");

        {
            let mut job_ids = self.job_ids.write().await;
            let scheduler = self.scheduler.read().await;
            for id in job_ids.drain(..) {
                if let Err(e) = scheduler.remove(&id).await {
                    tracing::warn!("⚠️ Failed to remove maintenance job {}: {}", id, e);
                }
            }
        }

        {
            let mut scheduler = self.scheduler.write().await;
            scheduler.shutdown().await?;
        }

        tracing::info!("✅ Maintenance scheduler stopped");
        Ok(())
    }

    async fn register(&self, job: Job) -> Result<()> {
        let id = {
            let scheduler = self.scheduler.write().await;
            scheduler.add(job).await?
        };
        self.job_ids.write().await.push(id);
        Ok(())
    }
}
