/// Roadmap REST API endpoints
/// 
/// Roadmap CRUD proper lives elsewhere; these routes cover what the ordering engine
/// needs to be driven end to end: creating a roadmap, deleting one (steps cascade and
/// reach the commit hook), and requesting a normalization pass on demand.

use crate::{
    api::{auth::CallerId, AppState},
    error::Result,
    roadmap::types::{NewRoadmap, Roadmap},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, post},
    Router,
};
use serde_json::{json, Value};

/// Create roadmap routes
pub fn create_roadmap_routes() -> Router<AppState> {
    Router::new()
        .route("/api/roadmaps", post(create_roadmap))
        .route("/api/roadmaps/{id}", delete(delete_roadmap))
        .route("/api/roadmaps/{id}/normalize", post(normalize_roadmap))
}

/// POST /api/roadmaps
async fn create_roadmap(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(body): Json<NewRoadmap>,
) -> Result<(StatusCode, Json<Roadmap>)> {
    let roadmap = state.storage.create_roadmap(&user_id, &body).await?;
    Ok((StatusCode::CREATED, Json(roadmap)))
}

/// Delete a roadmap and its steps
/// 
/// DELETE /api/roadmaps/{id}
async fn delete_roadmap(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.storage.delete_roadmap(&id, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Request a normalization pass without mutating anything
/// 
/// POST /api/roadmaps/{id}/normalize
async fn normalize_roadmap(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Value>)> {
    state.storage.owned_roadmap(&id, &user_id).await?;
    state.scheduler.enqueue(&id);

    tracing::info!("🌀 Normalization requested on demand for roadmap {}", id);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "detail": "Normalization scheduled", "roadmap_id": id })),
    ))
}
