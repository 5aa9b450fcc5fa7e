/// Request-facing error type for roadmap and step operations
///
/// Runtime components (lock, queue, engine) use `anyhow`; everything a handler can
/// return to a caller goes through `StepError` so it maps onto a status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T, E = StepError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StepError {
    #[error("missing caller identity")]
    Unauthenticated,

    #[error("roadmap not found: {0}")]
    RoadmapNotFound(String),

    #[error("step not found: {0}")]
    StepNotFound(String),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("invalid request: {0}")]
    Validation(String),

    /// Reorder named ids that do not belong to the roadmap; nothing was applied
    #[error("reorder references steps outside the roadmap: {invalid_step_ids:?}")]
    InvalidReorder { invalid_step_ids: Vec<String> },

    #[error("reorder lists steps more than once: {duplicate_step_ids:?}")]
    DuplicateReorder { duplicate_step_ids: Vec<String> },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl StepError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::RoadmapNotFound(_) | Self::StepNotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) | Self::InvalidReorder { .. } | Self::DuplicateReorder { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StepError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            Self::InvalidReorder { invalid_step_ids } => json!({ "invalid_step_ids": invalid_step_ids }),
            Self::DuplicateReorder { duplicate_step_ids } => {
                json!({ "duplicate_step_ids": duplicate_step_ids })
            }
            Self::Storage(e) => {
                tracing::error!("❌ Storage failure while serving request: {}", e);
                json!("internal storage error")
            }
            other => json!(other.to_string()),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reorder_errors_are_client_errors() {
        let invalid = StepError::InvalidReorder {
            invalid_step_ids: vec!["x".to_string()],
        };
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let dup = StepError::DuplicateReorder {
            duplicate_step_ids: vec!["a".to_string()],
        };
        assert_eq!(dup.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn ownership_and_lookup_statuses() {
        assert_eq!(StepError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(StepError::Forbidden("nope").status(), StatusCode::FORBIDDEN);
        assert_eq!(
            StepError::StepNotFound("s".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            StepError::Storage(sqlx::Error::PoolTimedOut).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
