/// SQLite persistence layer for roadmaps and their steps
///
/// Every mutation commits first and then publishes a [`StepChangeSet`] to the
/// configured [`CommitObserver`], so normalization is requested even for paths that
/// never call the scheduler themselves (a roadmap delete cascading to its steps).

use crate::{
    error::{Result, StepError},
    roadmap::{
        database::begin_write,
        ordering::{self, ReorderRejection},
        positions::PositionStore,
        types::{validate_title, NewRoadmap, NewStep, ReorderRequest, Roadmap, RoadmapStep, StepPatch, UpdatedStep},
    },
    runtime::hook::{CommitObserver, StepChangeSet, StepRef},
};
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

/// Roadmap and step CRUD with ownership checks
#[derive(Clone)]
pub struct StepStorage {
    pool: SqlitePool,
    /// Receives change sets after each commit
    observer: Option<Arc<dyn CommitObserver>>,
}

impl std::fmt::Debug for StepStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepStorage")
            .field("observed", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl StepStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, observer: None }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CommitObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn publish(&self, changes: StepChangeSet) {
        if changes.is_empty() {
            return;
        }
        if let Some(observer) = &self.observer {
            observer.after_commit(&changes);
        }
    }

    // ---- roadmaps ----

    pub async fn create_roadmap(&self, owner_id: &str, body: &NewRoadmap) -> Result<Roadmap> {
        validate_title(&body.title).map_err(StepError::Validation)?;

        let roadmap = Roadmap {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            title: body.title.trim().to_string(),
            is_public: body.is_public,
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO roadmaps (id, owner_id, title, is_public, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(&roadmap.id)
            .bind(&roadmap.owner_id)
            .bind(&roadmap.title)
            .bind(roadmap.is_public)
            .bind(roadmap.created_at)
            .execute(&self.pool)
            .await?;

        tracing::info!("🗺️ Created roadmap {} for {}", roadmap.id, owner_id);
        Ok(roadmap)
    }

    pub async fn get_roadmap(&self, roadmap_id: &str) -> Result<Roadmap> {
        sqlx::query_as::<_, Roadmap>("SELECT * FROM roadmaps WHERE id = ?")
            .bind(roadmap_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StepError::RoadmapNotFound(roadmap_id.to_string()))
    }

    /// Roadmap the caller may read
    pub async fn visible_roadmap(&self, roadmap_id: &str, user_id: &str) -> Result<Roadmap> {
        let roadmap = self.get_roadmap(roadmap_id).await?;
        if !roadmap.is_visible_to(user_id) {
            return Err(StepError::Forbidden("roadmap is private"));
        }
        Ok(roadmap)
    }

    /// Roadmap the caller may modify
    pub async fn owned_roadmap(&self, roadmap_id: &str, user_id: &str) -> Result<Roadmap> {
        let roadmap = self.get_roadmap(roadmap_id).await?;
        if roadmap.owner_id != user_id {
            return Err(StepError::Forbidden("not the roadmap owner"));
        }
        Ok(roadmap)
    }

    /// Delete a roadmap and, through the cascade, all of its steps
    ///
    /// Returns the ids of the steps removed with it.
    pub async fn delete_roadmap(&self, roadmap_id: &str, user_id: &str) -> Result<Vec<String>> {
        self.owned_roadmap(roadmap_id, user_id).await?;

        let mut tx = begin_write(&self.pool).await?;
        let step_ids: Vec<String> = sqlx::query_scalar("SELECT id FROM roadmap_steps WHERE roadmap_id = ?")
            .bind(roadmap_id)
            .fetch_all(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM roadmaps WHERE id = ?")
            .bind(roadmap_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("🗑️ Deleted roadmap {} ({} steps)", roadmap_id, step_ids.len());
        self.publish(StepChangeSet::deleted(
            step_ids.iter().map(|id| StepRef::new(id.as_str(), roadmap_id)).collect(),
        ));
        Ok(step_ids)
    }

    // ---- steps ----

    /// Insert a step at the caller's position, or after the current last step
    pub async fn create_step(&self, user_id: &str, body: &NewStep) -> Result<RoadmapStep> {
        validate_title(&body.title).map_err(StepError::Validation)?;
        self.owned_roadmap(&body.roadmap_id, user_id).await?;

        let mut tx = begin_write(&self.pool).await?;
        let position = match body.explicit_position() {
            Some(position) => position,
            None => {
                let max: Option<i64> = sqlx::query_scalar("SELECT MAX(position) FROM roadmap_steps WHERE roadmap_id = ?")
                    .bind(&body.roadmap_id)
                    .fetch_one(&mut *tx)
                    .await?;
                max.unwrap_or(0) + 1
            }
        };

        let step = sqlx::query_as::<_, RoadmapStep>(
            r#"
            INSERT INTO roadmap_steps
                (id, roadmap_id, title, description, position, estimated_hours, resources, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&body.roadmap_id)
        .bind(body.title.trim())
        .bind(&body.description)
        .bind(position)
        .bind(body.estimated_hours)
        .bind(&body.resources)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::debug!("➕ Created step {} in roadmap {} at position {}", step.id, step.roadmap_id, position);
        self.publish(StepChangeSet::created(StepRef::new(step.id.as_str(), step.roadmap_id.as_str())));
        Ok(step)
    }

    async fn find_step(&self, step_id: &str) -> Result<RoadmapStep> {
        sqlx::query_as::<_, RoadmapStep>("SELECT * FROM roadmap_steps WHERE id = ?")
            .bind(step_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StepError::StepNotFound(step_id.to_string()))
    }

    pub async fn get_step(&self, step_id: &str, user_id: &str) -> Result<RoadmapStep> {
        let step = self.find_step(step_id).await?;
        self.visible_roadmap(&step.roadmap_id, user_id).await?;
        Ok(step)
    }

    /// Steps of a roadmap in display order
    pub async fn list_steps(&self, roadmap_id: &str, user_id: &str, skip: i64, limit: i64) -> Result<Vec<RoadmapStep>> {
        self.visible_roadmap(roadmap_id, user_id).await?;

        let steps = sqlx::query_as::<_, RoadmapStep>(
            "SELECT * FROM roadmap_steps WHERE roadmap_id = ? ORDER BY position ASC, seq ASC LIMIT ? OFFSET ?",
        )
        .bind(roadmap_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;
        Ok(steps)
    }

    /// Apply a partial update; a position edit may collide or gap until the next pass
    pub async fn update_step(&self, step_id: &str, user_id: &str, patch: &StepPatch) -> Result<UpdatedStep> {
        if let Some(title) = &patch.title {
            validate_title(title).map_err(StepError::Validation)?;
        }

        let step = self.find_step(step_id).await?;
        self.owned_roadmap(&step.roadmap_id, user_id).await?;
        self.write_patch(&step, patch).await
    }

    /// Write only the columns present in `patch`; `before` may already be stale
    async fn write_patch(&self, before: &RoadmapStep, patch: &StepPatch) -> Result<UpdatedStep> {
        let step = sqlx::query_as::<_, RoadmapStep>(
            r#"
            UPDATE roadmap_steps SET
                title = COALESCE(?, title),
                description = COALESCE(?, description),
                position = COALESCE(?, position),
                estimated_hours = COALESCE(?, estimated_hours),
                resources = COALESCE(?, resources),
                note = COALESCE(?, note),
                completed = COALESCE(?, completed),
                updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&patch.title)
        .bind(&patch.description)
        .bind(patch.position)
        .bind(patch.estimated_hours)
        .bind(&patch.resources)
        .bind(&patch.note)
        .bind(patch.completed)
        .bind(Utc::now())
        .bind(&before.id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StepError::StepNotFound(before.id.clone()))?;

        let position_changed = patch.position.is_some_and(|position| position != before.position);
        if position_changed {
            tracing::debug!("✏️ Step {} moved {} -> {}", step.id, before.position, step.position);
        }
        self.publish(StepChangeSet::updated(vec![StepRef::new(step.id.as_str(), step.roadmap_id.as_str())]));

        Ok(UpdatedStep { step, position_changed })
    }

    /// Delete a step, leaving a gap; returns the roadmap it belonged to
    pub async fn delete_step(&self, step_id: &str, user_id: &str) -> Result<String> {
        let step = self.find_step(step_id).await?;
        self.owned_roadmap(&step.roadmap_id, user_id).await?;

        let deleted = sqlx::query("DELETE FROM roadmap_steps WHERE id = ?")
            .bind(step_id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StepError::StepNotFound(step_id.to_string()));
        }

        tracing::debug!("➖ Deleted step {} from roadmap {}", step_id, step.roadmap_id);
        self.publish(StepChangeSet::deleted(vec![StepRef::new(step_id, step.roadmap_id.as_str())]));
        Ok(step.roadmap_id)
    }

    /// Bulk reorder: listed ids take 1..k, the rest follow in prior relative order.
    ///
    /// Unknown or repeated ids reject the whole request before anything is written.
    /// Returns every step id of the roadmap in its new order.
    pub async fn reorder_steps(&self, user_id: &str, request: &ReorderRequest) -> Result<Vec<String>> {
        self.owned_roadmap(&request.roadmap_id, user_id).await?;

        let mut tx = begin_write(&self.pool).await?;
        let mut slots = PositionStore::load_slots(&mut tx, &request.roadmap_id).await?;

        let changes = ordering::plan_reorder(&slots, &request.order).map_err(|rejection| match rejection {
            ReorderRejection::UnknownSteps(invalid_step_ids) => StepError::InvalidReorder { invalid_step_ids },
            ReorderRejection::DuplicateSteps(duplicate_step_ids) => StepError::DuplicateReorder { duplicate_step_ids },
        })?;

        PositionStore::write_changes(&mut tx, &changes).await?;
        tx.commit().await?;

        ordering::apply_changes(&mut slots, &changes);
        let new_order: Vec<String> = ordering::current_order(&slots)
            .into_iter()
            .map(|slot| slot.step_id.clone())
            .collect();

        tracing::info!(
            "🔀 Reordered roadmap {} ({} of {} steps moved)",
            request.roadmap_id,
            changes.len(),
            slots.len()
        );
        self.publish(StepChangeSet::updated(
            changes
                .iter()
                .map(|change| StepRef::new(change.step_id.as_str(), request.roadmap_id.as_str()))
                .collect(),
        ));

        Ok(new_order)
    }
}
