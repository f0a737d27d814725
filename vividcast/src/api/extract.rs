//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::api::error::ApiError;

/// Header carrying the authenticated owner id, injected by the fronting
/// session layer. Authentication itself is out of scope for this service.
pub const OWNER_HEADER: &str = "x-user-id";

/// The calling owner's id, taken from [`OWNER_HEADER`].
#[derive(Debug, Clone)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::unauthorized("missing x-user-id header"))?;

        uuid::Uuid::parse_str(value)
            .map_err(|_| ApiError::unauthorized("x-user-id must be a UUID"))?;

        Ok(OwnerId(value.to_string()))
    }
}
