/// SkillStack: roadmap step ordering service
/// 
/// Keeps every roadmap's steps densely numbered 1..N under concurrent inserts,
/// deletes, position edits, and reorders. Mutations commit immediately; a deferred,
/// lock-guarded normalization pass reconciles positions afterwards.

// Core configuration and setup
pub mod config;

// Request-facing error type
pub mod error;

// Roadmap and step persistence, ordering planner, position store
pub mod roadmap;

// Normalization runtime - lease lock, engine, queue, dispatch, hook, cron maintenance
pub mod runtime;

// HTTP API layer - REST endpoints for steps and roadmaps
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use error::StepError;
pub use roadmap::{Database, Roadmap, RoadmapStep, StepStorage};
pub use runtime::{NormalizationEngine, NormalizationScheduler};
pub use server::{create_app, start_server, start_worker};
