//! # OAuth Flow Handlers
//!
//! Authorization URL construction and the callback endpoints. The `state`
//! parameter is a routing envelope only: the callback authorizes against
//! the session-derived user and rejects a mismatched envelope instead of
//! trusting it.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Json, Redirect},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::providers::{Provider, StateEnvelope};
use crate::server::AppState;

/// Query parameters for authorization URL generation
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlQuery {
    /// Provider identifier (e.g. "GOOGLE")
    pub provider: String,
    /// Comma-separated scope services (e.g. "gmail,sheets")
    pub services: Option<String>,
    /// Workflow to auto-link the credential to after the callback
    pub workflow_id: Option<Uuid>,
}

/// OAuth authorization URL response
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlResponse {
    /// Complete authorization URL for user redirection
    pub auth_url: String,
}

/// Query parameters delivered by the provider on callback
#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackQuery {
    pub provider: Option<String>,
    pub code: Option<String>,
    pub state: Option<String>,
    /// Provider-reported error (e.g. user denied consent)
    pub error: Option<String>,
}

/// Generate the authorization URL for a provider
#[utoipa::path(
    get,
    path = "/credentials/oauth/auth-url",
    security(("bearer_auth" = [])),
    params(AuthUrlQuery),
    responses(
        (status = 200, description = "Authorization URL generated", body = AuthUrlResponse),
        (status = 400, description = "Provider does not support OAuth2", body = ApiError),
        (status = 404, description = "Provider not found", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn auth_url(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(query): Query<AuthUrlQuery>,
) -> Result<Json<AuthUrlResponse>, ApiError> {
    let provider: Provider = query.provider.parse()?;
    let config = state.registry.get_config(provider)?;
    let oauth = config.as_oauth().ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &format!("provider '{}' does not support OAuth2", provider),
        )
    })?;

    let services: Vec<String> = query
        .services
        .map(|s| s.split(',').map(|v| v.trim().to_string()).collect())
        .unwrap_or_default();
    let scopes = oauth.scopes_for(&services);

    let envelope = StateEnvelope::new(user_id, query.workflow_id);
    let url = oauth.handler.generate_auth_url(&scopes, &envelope.encode())?;

    validate_authorize_url(&url)?;

    info!(user_id = %user_id, provider = %provider, "OAuth flow initiated");
    Ok(Json(AuthUrlResponse {
        auth_url: url.to_string(),
    }))
}

/// OAuth callback for providers using the query-parameter redirect form
#[utoipa::path(
    get,
    path = "/credentials/oauth/callback",
    security(("bearer_auth" = [])),
    params(CallbackQuery),
    responses(
        (status = 303, description = "Redirect to the dashboard on success"),
        (status = 400, description = "Missing code/state or rejected code", body = ApiError),
        (status = 401, description = "State envelope does not match the session", body = ApiError),
        (status = 502, description = "Provider unavailable", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn callback(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, ApiError> {
    let provider: Provider = query
        .provider
        .as_deref()
        .ok_or_else(|| missing_param("provider"))?
        .parse()?;
    handle_callback(state, user, provider, query).await
}

/// OAuth callback for Microsoft, which rejects query strings in redirect
/// URLs and therefore gets a path-based route
#[utoipa::path(
    get,
    path = "/credentials/oauth/microsoft/callback",
    security(("bearer_auth" = [])),
    params(CallbackQuery),
    responses(
        (status = 303, description = "Redirect to the dashboard on success"),
        (status = 400, description = "Missing code/state or rejected code", body = ApiError),
        (status = 401, description = "State envelope does not match the session", body = ApiError),
        (status = 502, description = "Provider unavailable", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn microsoft_callback(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, ApiError> {
    handle_callback(state, user, Provider::Microsoft, query).await
}

async fn handle_callback(
    state: AppState,
    AuthenticatedUser(session_user): AuthenticatedUser,
    provider: Provider,
    query: CallbackQuery,
) -> Result<Redirect, ApiError> {
    if let Some(error) = query.error {
        // The user declined consent or the provider aborted the flow;
        // the raw error code is safe to log but not worth echoing
        warn!(provider = %provider, error = %error, "OAuth flow aborted by provider");
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "OAUTH_FLOW_ABORTED",
            "The authorization flow was not completed",
        ));
    }

    let code = query.code.ok_or_else(|| missing_param("code"))?;
    let raw_state = query.state.ok_or_else(|| missing_param("state"))?;

    let envelope = StateEnvelope::decode(&raw_state).map_err(|e| {
        ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &e.to_string())
    })?;

    // The envelope routes, the session authorizes: a mismatch means this
    // callback was not started by the signed-in user
    if envelope.user_id != session_user {
        warn!(
            provider = %provider,
            "OAuth state envelope does not match the authenticated session"
        );
        return Err(crate::error::unauthorized(Some(
            "OAuth flow was started by a different user",
        )));
    }

    let handler = state.registry.auth_handler(provider)?;
    let secret = handler.handle_callback(&code).await?;

    state
        .credentials
        .store_from_callback(&session_user, secret, envelope.workflow_id.as_ref())
        .await?;

    info!(user_id = %session_user, provider = %provider, "OAuth credential connected");
    Ok(Redirect::to(&state.config.dashboard_url))
}

fn missing_param(name: &str) -> ApiError {
    ApiError::new(
        StatusCode::BAD_REQUEST,
        "VALIDATION_FAILED",
        &format!("missing required query parameter '{}'", name),
    )
}

/// Validate an authorization URL against OAuth 2.0 requirements
fn validate_authorize_url(url: &Url) -> Result<(), ApiError> {
    if url.scheme() != "https" {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Handler bug: authorization URL must use HTTPS",
        ));
    }

    // No fragment per RFC 6749 section 3.1
    if url.fragment().is_some() {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Handler bug: authorization URL must not include a fragment",
        ));
    }

    if url.as_str().len() > 2048 {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Handler bug: authorization URL exceeds 2048 characters",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_authorize_url_requires_https() {
        let url = Url::parse("http://example.com/authorize").unwrap();
        assert!(validate_authorize_url(&url).is_err());

        let url = Url::parse("https://example.com/authorize?a=b").unwrap();
        assert!(validate_authorize_url(&url).is_ok());
    }

    #[test]
    fn test_validate_authorize_url_rejects_fragment() {
        let url = Url::parse("https://example.com/authorize#fragment").unwrap();
        assert!(validate_authorize_url(&url).is_err());
    }
}
