/// Roadmap step management
/// 
/// Steps of a learning roadmap and the positions that order them:
/// - Type definitions (Roadmap, RoadmapStep, request bodies)
/// - SQLite schema and connection setup
/// - Pure ordering planner (normalize, reorder)
/// - Position store used by normalization passes
/// - Step storage whose commits feed the normalization hook

pub mod types;

pub mod database;

pub mod ordering;

pub mod positions;

pub mod storage;

pub use database::Database;
pub use positions::PositionStore;
pub use storage::StepStorage;
pub use types::{NewRoadmap, NewStep, ReorderRequest, Roadmap, RoadmapStep, StepPatch};
