/// Caller identity
///
/// Authentication happens upstream; requests arrive with the authenticated user id in
/// the `x-user-id` header. A missing or blank header is rejected with 401.

use crate::error::StepError;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const USER_HEADER: &str = "x-user-id";

/// Authenticated caller id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId(pub String);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = StepError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| CallerId(value.to_string()))
            .ok_or(StepError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<CallerId, StepError> {
        let (mut parts, _) = request.into_parts();
        CallerId::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn header_is_required() {
        let missing = Request::builder().body(()).unwrap();
        assert!(matches!(extract(missing).await, Err(StepError::Unauthenticated)));

        let blank = Request::builder().header(USER_HEADER, "  ").body(()).unwrap();
        assert!(matches!(extract(blank).await, Err(StepError::Unauthenticated)));

        let present = Request::builder().header(USER_HEADER, "alice").body(()).unwrap();
        assert_eq!(extract(present).await.unwrap(), CallerId("alice".into()));
    }
}
