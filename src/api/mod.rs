/// HTTP API Layer
/// 
/// REST endpoints for roadmaps and their ordered steps:
/// - Step CRUD and bulk reorder
/// - Roadmap create/delete and on-demand normalization
/// - Caller identity extraction from the `x-user-id` header
///
/// Handlers request normalization after their own commit; the storage commit hook
/// requests it again as a backstop, which the queue coalesces or the pass absorbs.

use crate::{
    roadmap::StepStorage,
    runtime::{dispatch::NormalizationScheduler, queue::JobQueue},
};
use std::sync::Arc;

// Caller identity extractor
pub mod auth;

// Step endpoints (create/list/get/update/delete/reorder)
pub mod steps;

// Roadmap endpoints (create/delete/normalize)
pub mod roadmaps;

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Roadmap and step persistence
    pub storage: StepStorage,
    /// Entry point for normalization requests
    pub scheduler: Arc<NormalizationScheduler>,
    /// Durable queue, when queue-backed scheduling is enabled
    pub queue: Option<Arc<JobQueue>>,
}

// Re-export router builders
pub use roadmaps::create_roadmap_routes;
pub use steps::create_step_routes;
