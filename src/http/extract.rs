use super::handlers::ErrorResponse;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

/// Header carrying the authenticated caller's id
pub const OWNER_HEADER: &str = "x-user-id";

/// Authenticated caller, as resolved by the upstream auth layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match owner {
            Some(owner) => Ok(Owner(owner.to_string())),
            None => Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: format!("Missing {} header", OWNER_HEADER),
                    code: "unauthenticated".to_string(),
                    partial_transcript: None,
                    diagnostics: None,
                }),
            )
                .into_response()),
        }
    }
}
