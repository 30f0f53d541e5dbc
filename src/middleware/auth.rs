use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::secrets_match;
use crate::state::AppState;

/// Authentication failures on the call API.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("Invalid API secret")]
    Unauthorized,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "status": "error", "message": self.to_string() }));
        let mut response = (StatusCode::UNAUTHORIZED, body).into_response();
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        response
    }
}

/// Extract the bearer token from the `Authorization` header.
fn extract_token(request: &Request) -> Result<&str, AuthError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?;

    auth_header
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)
}

/// Require `Authorization: Bearer <API secret>` on every request.
///
/// The token is compared in constant time against the configured secret,
/// or the generated one when none is configured. Mismatches get a 401.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let authorized = secrets_match(extract_token(&request)?, &state.api_secret);

    if !authorized {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "API secret authentication failed: token mismatch"
        );
        return Err(AuthError::Unauthorized);
    }

    tracing::debug!(path = %request.uri().path(), "API secret authentication successful");
    Ok(next.run(request).await)
}
