/// Roadmap and step type definitions
///
/// Records mirror the `roadmaps` and `roadmap_steps` tables; request payloads are the
/// JSON bodies accepted by the step endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Maximum length of a step title
pub const MAX_TITLE_LEN: usize = 200;

/// A roadmap owning an ordered list of steps
///
/// Roadmap CRUD belongs to an external collaborator; only what the ownership
/// checks and cascade deletes need is modelled here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Roadmap {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl Roadmap {
    /// Public roadmaps are readable by anyone, private ones by their owner
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        self.is_public || self.owner_id == user_id
    }
}

/// One ordered step of a roadmap
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoadmapStep {
    /// Unique step identifier (UUID v4)
    pub id: String,
    pub roadmap_id: String,
    /// Insertion sequence; breaks ties between equal positions
    #[serde(skip)]
    pub seq: i64,
    pub title: String,
    pub description: Option<String>,
    /// 1..N once the roadmap has settled; may gap or collide in between
    pub position: i64,
    pub estimated_hours: Option<f64>,
    pub resources: Option<String>,
    pub note: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of `POST /api/roadmaps`
#[derive(Debug, Clone, Deserialize)]
pub struct NewRoadmap {
    pub title: String,
    #[serde(default)]
    pub is_public: bool,
}

/// Body of `POST /api/roadmap-steps`
#[derive(Debug, Clone, Deserialize)]
pub struct NewStep {
    pub roadmap_id: String,
    #[serde(default = "default_title")]
    pub title: String,
    pub description: Option<String>,
    /// Absent or 0 appends after the current last step
    pub position: Option<i64>,
    pub estimated_hours: Option<f64>,
    pub resources: Option<String>,
}

fn default_title() -> String {
    "Untitled Step".to_string()
}

impl NewStep {
    /// Explicit position requested by the caller, if any
    pub fn explicit_position(&self) -> Option<i64> {
        self.position.filter(|p| *p != 0)
    }
}

/// Body of `PUT /api/roadmap-steps/{id}`; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub position: Option<i64>,
    pub estimated_hours: Option<f64>,
    pub resources: Option<String>,
    pub note: Option<String>,
    pub completed: Option<bool>,
}

/// Body of `PATCH /api/roadmap-steps/reorder`
#[derive(Debug, Clone, Deserialize)]
pub struct ReorderRequest {
    pub roadmap_id: String,
    pub order: Vec<String>,
}

/// Result of a step update, telling the handler whether ordering was touched
#[derive(Debug, Clone)]
pub struct UpdatedStep {
    pub step: RoadmapStep,
    pub position_changed: bool,
}

/// Validate a step title against the column limits
pub fn validate_title(title: &str) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("title must not be empty".to_string());
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(format!("title exceeds {MAX_TITLE_LEN} characters"));
    }
    Ok(())
}
