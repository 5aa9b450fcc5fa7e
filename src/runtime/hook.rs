/// Commit hook: turns committed step changes into normalization requests
///
/// The storage layer publishes a typed [`StepChangeSet`] after every commit that
/// created, updated, or deleted steps, including indirect paths such as a roadmap delete
/// cascading to its steps. The hook collects the distinct roadmap ids and asks the
/// scheduler for one pass per roadmap.

use crate::runtime::dispatch::NormalizationScheduler;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A step touched by a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRef {
    pub step_id: String,
    /// Owning roadmap, when it could be resolved
    pub roadmap_id: Option<String>,
}

impl StepRef {
    pub fn new(step_id: impl Into<String>, roadmap_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            roadmap_id: Some(roadmap_id.into()),
        }
    }
}

/// Steps created, updated, and deleted by one commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepChangeSet {
    pub created: Vec<StepRef>,
    pub updated: Vec<StepRef>,
    pub deleted: Vec<StepRef>,
}

impl StepChangeSet {
    pub fn created(step: StepRef) -> Self {
        Self {
            created: vec![step],
            ..Self::default()
        }
    }

    pub fn updated(steps: Vec<StepRef>) -> Self {
        Self {
            updated: steps,
            ..Self::default()
        }
    }

    pub fn deleted(steps: Vec<StepRef>) -> Self {
        Self {
            deleted: steps,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Distinct roadmaps touched by the commit
    pub fn affected_roadmaps(&self) -> BTreeSet<String> {
        self.created
            .iter()
            .chain(&self.updated)
            .chain(&self.deleted)
            .filter_map(|step| step.roadmap_id.clone())
            .collect()
    }
}

/// Receives change sets after the storage layer commits
pub trait CommitObserver: Send + Sync {
    fn after_commit(&self, changes: &StepChangeSet);
}

/// Schedules one normalization pass per affected roadmap
pub struct NormalizationHook {
    scheduler: Arc<NormalizationScheduler>,
}

impl NormalizationHook {
    pub fn new(scheduler: Arc<NormalizationScheduler>) -> Self {
        Self { scheduler }
    }
}

impl CommitObserver for NormalizationHook {
    fn after_commit(&self, changes: &StepChangeSet) {
        for roadmap_id in changes.affected_roadmaps() {
            self.scheduler.enqueue(&roadmap_id);
            tracing::debug!("🌀 Scheduled normalization for roadmap {}", roadmap_id);
        }
    }
}
