//! Request-scoped context extracted from HTTP requests.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use ulid::Ulid;

use crate::api::error::ApiError;

pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Request id plus the raw bearer token, if one was presented.
///
/// The token is handed to the configured verifier and must never be
/// persisted or logged.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    bearer_token: Option<String>,
}

impl RequestContext {
    pub fn token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn bearer_from_authorization_header(
    headers: &HeaderMap,
    request_id: &str,
) -> Result<Option<String>, ApiError> {
    let Some(auth_value) = header_string(headers, AUTHORIZATION_HEADER) else {
        return Ok(None);
    };

    let auth_value = auth_value.trim();
    let Some(token) = auth_value.strip_prefix("Bearer ") else {
        return Err(ApiError::unauthorized(
            "invalid_authorization",
            "Authorization must be a Bearer token",
        )
        .with_request_id(request_id.to_string()));
    };

    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::unauthorized(
            "invalid_authorization",
            "Authorization Bearer token cannot be empty",
        )
        .with_request_id(request_id.to_string()));
    }

    Ok(Some(token.to_string()))
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = header_string(&parts.headers, "x-request-id")
            .unwrap_or_else(|| Ulid::new().to_string());

        let bearer_token = bearer_from_authorization_header(&parts.headers, &request_id)?;

        Ok(Self {
            request_id,
            bearer_token,
        })
    }
}
