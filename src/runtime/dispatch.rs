/// Deferred execution of normalization passes
///
/// - [`JobRunner`]: one interface for handing a roadmap's pass to an executor
/// - [`InProcessRunner`]: detached tokio task, lives and dies with this process
/// - [`QueueRunner`]: durable job row for a `skillstack worker` process
/// - [`NormalizationScheduler`]: the `enqueue` facade the rest of the crate uses
///
/// `enqueue` never blocks and never fails the caller. With the queue configured, a
/// failed queue insert falls back to the in-process runner; the downgrade is logged at
/// `warn`, counted in [`DispatchHealth`] and in the queue fallback metric. If the
/// fallback cannot start either, the request is dropped and logged; the next
/// mutation's trigger reconciles the drift.

use std::sync::Arc;

use anyhow::Result;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::runtime::{
    engine::NormalizationEngine,
    metrics::{self, outcome},
    queue::{EnqueueResult, JobQueue, NORMALIZE_JOB},
};

/// How a runner accepted a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Stored as a durable job
    Queued { job_id: i64 },
    /// Folded into a job that has not run yet
    Coalesced,
    /// Running in a detached task of this process
    Spawned,
}

/// Executor for normalization passes
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Short name for logs and health output
    fn name(&self) -> &'static str;

    /// Hand over a pass for `roadmap_id`; must not wait for the pass itself
    async fn submit(&self, roadmap_id: &str) -> Result<Submission>;
}

/// Spawns each pass as a detached tokio task
pub struct InProcessRunner {
    engine: Arc<NormalizationEngine>,
}

impl InProcessRunner {
    pub fn new(engine: Arc<NormalizationEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl JobRunner for InProcessRunner {
    fn name(&self) -> &'static str {
        "in_process"
    }

    async fn submit(&self, roadmap_id: &str) -> Result<Submission> {
        let handle = tokio::runtime::Handle::try_current()?;
        let engine = Arc::clone(&self.engine);
        let roadmap_id = roadmap_id.to_string();
        handle.spawn(async move { engine.normalize_logged(&roadmap_id).await });
        Ok(Submission::Spawned)
    }
}

/// Writes a `normalize_roadmap_steps` job to the durable queue
pub struct QueueRunner {
    queue: Arc<JobQueue>,
}

impl QueueRunner {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl JobRunner for QueueRunner {
    fn name(&self) -> &'static str {
        "queue"
    }

    async fn submit(&self, roadmap_id: &str) -> Result<Submission> {
        Ok(match self.queue.enqueue(NORMALIZE_JOB, roadmap_id).await? {
            EnqueueResult::Enqueued { job_id } => Submission::Queued { job_id },
            EnqueueResult::Coalesced => Submission::Coalesced,
        })
    }
}

/// What happened to one normalization request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Accepted by the configured runner
    Accepted(Submission),
    /// Queue failed; the pass runs in-process instead
    FellBack { reason: String },
    /// Nothing could take the pass
    Dropped { reason: String },
}

/// Observable dispatch counters and degradation state
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchHealth {
    /// Configured primary runner
    pub mode: String,
    pub queued: u64,
    pub coalesced: u64,
    pub in_process: u64,
    pub fallbacks: u64,
    pub dropped: u64,
    /// True while the most recent queue attempt failed
    pub degraded: bool,
    pub last_fallback_at: Option<DateTime<Utc>>,
    pub last_fallback_reason: Option<String>,
}

/// Entry point for requesting normalization passes
pub struct NormalizationScheduler {
    queue: Option<Arc<dyn JobRunner>>,
    local: Arc<dyn JobRunner>,
    health: ArcSwap<DispatchHealth>,
}

impl NormalizationScheduler {
    /// `queue` is the durable runner when configured; `local` always backs it up
    pub fn new(queue: Option<Arc<dyn JobRunner>>, local: Arc<dyn JobRunner>) -> Self {
        let mode = queue.as_ref().map_or(local.name(), |q| q.name()).to_string();
        Self {
            queue,
            local,
            health: ArcSwap::from_pointee(DispatchHealth {
                mode,
                ..DispatchHealth::default()
            }),
        }
    }

    /// Request a pass for `roadmap_id` and return immediately.
    ///
    /// Dispatch itself runs on a spawned task so the caller never waits on the queue.
    pub fn enqueue(self: &Arc<Self>, roadmap_id: &str) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                self.record(|h| h.dropped += 1);
                metrics::record_dispatch(outcome::DROPPED);
                tracing::error!("❌ No runtime to schedule normalization for roadmap {}: {}", roadmap_id, e);
                return;
            }
        };

        let scheduler = Arc::clone(self);
        let roadmap_id = roadmap_id.to_string();
        handle.spawn(async move {
            scheduler.dispatch(&roadmap_id).await;
        });
    }

    /// Hand a pass to the configured runner, falling back to in-process execution
    pub async fn dispatch(&self, roadmap_id: &str) -> DispatchOutcome {
        let Some(queue) = &self.queue else {
            return self.dispatch_local(roadmap_id).await;
        };

        match queue.submit(roadmap_id).await {
            Ok(submission) => {
                let coalesced = submission == Submission::Coalesced;
                self.record(|h| {
                    h.degraded = false;
                    if coalesced {
                        h.coalesced += 1;
                    } else {
                        h.queued += 1;
                    }
                });
                metrics::record_dispatch(if coalesced { outcome::COALESCED } else { outcome::QUEUED });
                tracing::debug!("📦 Normalization for roadmap {} handed to queue: {:?}", roadmap_id, submission);
                DispatchOutcome::Accepted(submission)
            }
            Err(e) => {
                let reason = format!("{e:#}");
                tracing::warn!(
                    "⚠️ Queue unavailable for roadmap {}, running normalization in-process: {}",
                    roadmap_id,
                    reason
                );
                self.record(|h| {
                    h.degraded = true;
                    h.fallbacks += 1;
                    h.last_fallback_at = Some(Utc::now());
                    h.last_fallback_reason = Some(reason.clone());
                });
                metrics::record_fallback();

                match self.dispatch_local(roadmap_id).await {
                    DispatchOutcome::Accepted(_) => DispatchOutcome::FellBack { reason },
                    dropped => dropped,
                }
            }
        }
    }

    async fn dispatch_local(&self, roadmap_id: &str) -> DispatchOutcome {
        match self.local.submit(roadmap_id).await {
            Ok(submission) => {
                self.record(|h| h.in_process += 1);
                metrics::record_dispatch(outcome::IN_PROCESS);
                tracing::debug!("🧵 In-process normalization scheduled for roadmap {}", roadmap_id);
                DispatchOutcome::Accepted(submission)
            }
            Err(e) => {
                let reason = format!("{e:#}");
                self.record(|h| h.dropped += 1);
                metrics::record_dispatch(outcome::DROPPED);
                tracing::error!("❌ Dropped normalization request for roadmap {}: {}", roadmap_id, reason);
                DispatchOutcome::Dropped { reason }
            }
        }
    }

    /// Current dispatch counters
    pub fn health(&self) -> Arc<DispatchHealth> {
        self.health.load_full()
    }

    fn record(&self, update: impl Fn(&mut DispatchHealth)) {
        self.health.rcu(|current| {
            let mut next = DispatchHealth::clone(current);
            update(&mut next);
            next
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::metrics::{self, outcome};
    use std::sync::Mutex;

    /// Runner that records submissions, optionally failing every call
    struct Recording {
        name: &'static str,
        fail_with: Option<&'static str>,
        seen: Mutex<Vec<String>>,
    }

    impl Recording {
        fn ok(name: &'static str) -> Arc<Self> {
            Arc::new(Self { name, fail_with: None, seen: Mutex::new(Vec::new()) })
        }

        fn failing(name: &'static str, reason: &'static str) -> Arc<Self> {
            Arc::new(Self { name, fail_with: Some(reason), seen: Mutex::new(Vec::new()) })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobRunner for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn submit(&self, roadmap_id: &str) -> Result<Submission> {
            self.seen.lock().unwrap().push(roadmap_id.to_string());
            match self.fail_with {
                Some(reason) => Err(anyhow::anyhow!(reason)),
                None => Ok(Submission::Spawned),
            }
        }
    }

    #[tokio::test]
    async fn in_process_only_mode_uses_local_runner() {
        let local = Recording::ok("in_process");
        let scheduler = NormalizationScheduler::new(None, local.clone());

        let outcome = scheduler.dispatch("r1").await;
        assert_eq!(outcome, DispatchOutcome::Accepted(Submission::Spawned));
        assert_eq!(local.seen(), vec!["r1"]);

        let health = scheduler.health();
        assert_eq!(health.mode, "in_process");
        assert_eq!(health.in_process, 1);
    }

    #[tokio::test]
    async fn queue_failure_falls_back_and_is_observable() {
        let queue = Recording::failing("queue", "connection refused");
        let local = Recording::ok("in_process");
        let scheduler = NormalizationScheduler::new(Some(queue.clone() as Arc<dyn JobRunner>), local.clone());

        let outcome = scheduler.dispatch("r1").await;
        assert!(matches!(outcome, DispatchOutcome::FellBack { ref reason } if reason.contains("connection refused")));
        assert_eq!(queue.seen(), vec!["r1"]);
        assert_eq!(local.seen(), vec!["r1"]);

        let health = scheduler.health();
        assert_eq!(health.mode, "queue");
        assert!(health.degraded);
        assert_eq!(health.fallbacks, 1);
        assert!(health.last_fallback_at.is_some());
    }

    #[tokio::test]
    async fn double_failure_drops_without_panicking() {
        let scheduler = NormalizationScheduler::new(
            Some(Recording::failing("queue", "down") as Arc<dyn JobRunner>),
            Recording::failing("in_process", "no runtime"),
        );
        let outcome = scheduler.dispatch("r1").await;
        assert!(matches!(outcome, DispatchOutcome::Dropped { .. }));
        assert_eq!(scheduler.health().dropped, 1);
    }

    #[tokio::test]
    async fn enqueue_returns_before_dispatch_runs() {
        let local = Recording::ok("in_process");
        let scheduler = Arc::new(NormalizationScheduler::new(None, local.clone()));

        scheduler.enqueue("r1");
        scheduler.enqueue("r2");

        for _ in 0..50 {
            if local.seen().len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let mut seen = local.seen();
        seen.sort();
        assert_eq!(seen, vec!["r1", "r2"]);
    }

    /// Recorder keeping counters by name and labels for one thread
    #[derive(Default)]
    struct CountingRecorder {
        counters: Mutex<std::collections::HashMap<String, Arc<std::sync::atomic::AtomicU64>>>,
    }

    impl CountingRecorder {
        fn value(&self, name: &str) -> u64 {
            self.counters
                .lock()
                .unwrap()
                .get(name)
                .map_or(0, |c| c.load(std::sync::atomic::Ordering::SeqCst))
        }
    }

    impl ::metrics::Recorder for CountingRecorder {
        fn describe_counter(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}
        fn describe_gauge(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}
        fn describe_histogram(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}

        fn register_counter(&self, key: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Counter {
            let mut name = key.name().to_string();
            for label in key.labels() {
                name.push_str(&format!("{{{}={}}}", label.key(), label.value()));
            }
            let counter = Arc::clone(self.counters.lock().unwrap().entry(name).or_default());
            ::metrics::Counter::from_arc(counter)
        }

        fn register_gauge(&self, _: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Gauge {
            ::metrics::Gauge::noop()
        }

        fn register_histogram(&self, _: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Histogram {
            ::metrics::Histogram::noop()
        }
    }

    #[test]
    fn fallback_and_outcomes_are_counted() {
        let recorder = CountingRecorder::default();
        let scheduler = NormalizationScheduler::new(
            Some(Recording::failing("queue", "disk full") as Arc<dyn JobRunner>),
            Recording::ok("in_process"),
        );

        ::metrics::with_local_recorder(&recorder, || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                scheduler.dispatch("r1").await;
                scheduler.dispatch("r2").await;
            });
        });

        assert_eq!(recorder.value(metrics::QUEUE_FALLBACKS), 2);
        assert_eq!(
            recorder.value(&format!("{}{{outcome={}}}", metrics::DISPATCH_REQUESTS, outcome::IN_PROCESS)),
            2
        );
        assert_eq!(
            recorder.value(&format!("{}{{outcome={}}}", metrics::DISPATCH_REQUESTS, outcome::QUEUED)),
            0
        );
    }

    #[test]
    fn enqueue_outside_a_runtime_is_dropped() {
        let scheduler = Arc::new(NormalizationScheduler::new(None, Recording::ok("in_process")));
        scheduler.enqueue("r1");
        assert_eq!(scheduler.health().dropped, 1);
    }
}
