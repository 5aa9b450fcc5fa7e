/// Roadmap step REST API endpoints
/// 
/// Every mutating handler commits through [`StepStorage`] and then asks the scheduler
/// for a normalization pass of the affected roadmap. Normalization outcome never
/// changes the response: the handler's own commit has already succeeded.

use crate::{
    api::{auth::CallerId, AppState},
    error::{Result, StepError},
    roadmap::types::{NewStep, ReorderRequest, RoadmapStep, StepPatch},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};

/// Largest page `GET /api/roadmap-steps/roadmap/{id}` returns
const MAX_PAGE: i64 = 1000;

/// Paging for step listings
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    200
}

/// Response of a bulk reorder
#[derive(Debug, Serialize, Deserialize)]
pub struct ReorderResponse {
    pub detail: String,
    /// Every step of the roadmap in its new order
    pub new_order: Vec<String>,
}

/// Create step routes
pub fn create_step_routes() -> Router<AppState> {
    Router::new()
        .route("/api/roadmap-steps", post(create_step))
        .route("/api/roadmap-steps/reorder", patch(reorder_steps))
        .route("/api/roadmap-steps/roadmap/{roadmap_id}", get(list_steps))
        .route(
            "/api/roadmap-steps/{id}",
            get(get_step).put(update_step).delete(delete_step),
        )
}

/// Create a step
/// 
/// POST /api/roadmap-steps
/// Body: { "roadmap_id": "...", "title": "...", "position": 3 }
async fn create_step(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(body): Json<NewStep>,
) -> Result<(StatusCode, Json<RoadmapStep>)> {
    let step = state.storage.create_step(&user_id, &body).await?;
    state.scheduler.enqueue(&step.roadmap_id);

    Ok((StatusCode::CREATED, Json(step)))
}

/// List a roadmap's steps in order
/// 
/// GET /api/roadmap-steps/roadmap/{roadmap_id}?skip=0&limit=200
async fn list_steps(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(roadmap_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<RoadmapStep>>> {
    if params.skip < 0 {
        return Err(StepError::Validation("skip must not be negative".into()));
    }
    if !(1..=MAX_PAGE).contains(&params.limit) {
        return Err(StepError::Validation(format!("limit must be between 1 and {MAX_PAGE}")));
    }

    let steps = state
        .storage
        .list_steps(&roadmap_id, &user_id, params.skip, params.limit)
        .await?;
    Ok(Json(steps))
}

/// GET /api/roadmap-steps/{id}
async fn get_step(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(id): Path<String>,
) -> Result<Json<RoadmapStep>> {
    Ok(Json(state.storage.get_step(&id, &user_id).await?))
}

/// Partially update a step
/// 
/// PUT /api/roadmap-steps/{id}
/// Body: any of title, description, position, estimated_hours, resources, note, completed
async fn update_step(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(id): Path<String>,
    Json(patch): Json<StepPatch>,
) -> Result<Json<RoadmapStep>> {
    let updated = state.storage.update_step(&id, &user_id, &patch).await?;
    if updated.position_changed {
        state.scheduler.enqueue(&updated.step.roadmap_id);
    }

    Ok(Json(updated.step))
}

/// DELETE /api/roadmap-steps/{id}
async fn delete_step(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let roadmap_id = state.storage.delete_step(&id, &user_id).await?;
    state.scheduler.enqueue(&roadmap_id);

    Ok(StatusCode::NO_CONTENT)
}

/// Bulk reorder
/// 
/// PATCH /api/roadmap-steps/reorder
/// Body: { "roadmap_id": "...", "order": ["step-c", "step-a"] }
async fn reorder_steps(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(request): Json<ReorderRequest>,
) -> Result<impl IntoResponse> {
    let new_order = state.storage.reorder_steps(&user_id, &request).await?;
    state.scheduler.enqueue(&request.roadmap_id);

    Ok(Json(ReorderResponse {
        detail: "Steps reordered successfully".to_string(),
        new_order,
    }))
}
