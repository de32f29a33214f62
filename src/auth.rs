//! # Authentication
//!
//! Bearer-token middleware for requests proxied by the session collaborator.
//! The collaborator authenticates the browser session itself and forwards
//! the resolved user in `X-User-Id`; this service verifies the shared
//! bearer token (constant-time) and exposes the user through an extractor.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized, validation_error};
use crate::server::AppState;

/// The authenticated user forwarded by the session collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Uuid);

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Middleware validating the bearer token and the `X-User-Id` header
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers().clone();

    let token = extract_bearer_token(&headers)?;
    validate_token(&config, token)?;

    let user = extract_user_id(&headers)?;
    tracing::debug!(user_id = %user.0, "Authenticated request");

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))
        .and_then(|value| {
            value
                .to_str()
                .map_err(|_| unauthorized(Some("Invalid Authorization header")))
        })
        .and_then(|header| {
            header
                .strip_prefix("Bearer ")
                .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
        })
}

fn validate_token(config: &AppConfig, token: &str) -> Result<(), ApiError> {
    let is_valid = config
        .service_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid bearer token")))
    }
}

fn extract_user_id(headers: &HeaderMap) -> Result<AuthenticatedUser, ApiError> {
    let header_value = headers.get("X-User-Id").ok_or_else(|| {
        validation_error(
            "Missing required header",
            serde_json::json!({ "X-User-Id": "Required header is missing" }),
        )
    })?;

    let raw = header_value.to_str().map_err(|_| {
        validation_error(
            "Invalid header value",
            serde_json::json!({ "X-User-Id": "Header is not valid UTF-8" }),
        )
    })?;

    let user_id = raw.parse::<Uuid>().map_err(|_| {
        validation_error(
            "Invalid header value",
            serde_json::json!({ "X-User-Id": "Header is not a valid UUID" }),
        )
    })?;

    Ok(AuthenticatedUser(user_id))
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Request not authenticated")))
    }
}
