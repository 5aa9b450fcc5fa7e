/// Normalization Runtime
/// 
/// Everything that runs a normalization pass and decides when and where it runs:
/// - Per-roadmap lease lock with busy retry, TTL, and token-conditional release
/// - Lock-guarded normalization engine
/// - Durable job queue plus the worker that drains it
/// - Dispatch with queue-first, in-process fallback strategy
/// - Commit hook turning step changes into normalization requests
/// - Cron maintenance for stalled jobs, lapsed leases, and periodic sweeps

// Distributed lease lock (SQLite-backed, in-memory for tests)
pub mod lock;

// Lock-guarded normalization pass
pub mod engine;

// Durable SQLite job queue
pub mod queue;

// Deferred execution: runners and the scheduler facade
pub mod dispatch;

// Commit hook for step changes
pub mod hook;

// Queue consumer for `skillstack worker`
pub mod worker;

// Background cron maintenance service
pub mod scheduler;

// Dispatch counters and pass timings
pub mod metrics;

// Re-export main types
pub use dispatch::{DispatchHealth, InProcessRunner, JobRunner, NormalizationScheduler, QueueRunner};
pub use engine::{NormalizationEngine, PassReport};
pub use hook::{CommitObserver, NormalizationHook, StepChangeSet, StepRef};
pub use lock::{LeaseLock, SqliteLeaseLock};
pub use queue::JobQueue;
pub use scheduler::{MaintenanceScheduler, MaintenanceTasks};
pub use worker::QueueWorker;
