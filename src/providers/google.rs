//! Google OAuth handler
//!
//! Implements the authorization-code flow against Google's OAuth2 endpoints.
//! Offline access is always requested with a forced consent prompt so every
//! first-time authorization yields a refresh token.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::providers::trait_::{AuthError, AuthHandler, RefreshedToken};
use crate::secrets::{CredentialSecret, GoogleOAuthSecret};

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Google OAuth handler
pub struct GoogleAuthHandler {
    client_id: String,
    client_secret: String,
    redirect_url: String,
    auth_base: String,
    token_base: String,
    http: reqwest::Client,
}

impl GoogleAuthHandler {
    pub fn new(client_id: String, client_secret: String, redirect_url: String) -> Self {
        Self::with_endpoints(
            client_id,
            client_secret,
            redirect_url,
            GOOGLE_AUTH_URL.to_string(),
            GOOGLE_TOKEN_URL.to_string(),
        )
    }

    /// Construct a handler against alternative endpoints (used by tests to
    /// point at a mock server).
    pub fn with_endpoints(
        client_id: String,
        client_secret: String,
        redirect_url: String,
        auth_base: String,
        token_base: String,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_url,
            auth_base,
            token_base,
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    /// Lifetime in seconds
    expires_in: Option<i64>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

/// Map a non-success token endpoint response to an auth error without
/// echoing the raw body anywhere user-visible.
async fn map_token_error(response: reqwest::Response) -> AuthError {
    let status = response.status();
    let body: GoogleErrorResponse = response.json().await.unwrap_or(GoogleErrorResponse {
        error: None,
        error_description: None,
    });
    let code = body.error.unwrap_or_default();

    if status.is_server_error() {
        return AuthError::ProviderUnavailable(format!("token endpoint returned {}", status));
    }
    if code == "invalid_grant" || code == "invalid_code" {
        return AuthError::InvalidCode(body.error_description.unwrap_or(code));
    }
    AuthError::InvalidCode(format!("token endpoint rejected request ({})", status))
}

#[async_trait]
impl AuthHandler for GoogleAuthHandler {
    fn generate_auth_url(&self, scopes: &[String], state: &str) -> Result<Url, AuthError> {
        let mut url = Url::parse(&self.auth_base)
            .map_err(|e| AuthError::MalformedResponse(format!("bad auth base url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", state);
        Ok(url)
    }

    async fn handle_callback(&self, code: &str) -> Result<CredentialSecret, AuthError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_url.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self.http.post(&self.token_base).form(&params).send().await?;
        if !response.status().is_success() {
            return Err(map_token_error(response).await);
        }

        let tokens: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        let (Some(access_token), Some(refresh_token), Some(expires_in)) =
            (tokens.access_token, tokens.refresh_token, tokens.expires_in)
        else {
            return Err(AuthError::MalformedResponse(
                "incomplete token data from Google".to_string(),
            ));
        };

        debug!("Exchanged Google authorization code");

        Ok(CredentialSecret::GoogleOAuth(GoogleOAuthSecret {
            access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
            scopes: tokens
                .scope
                .map(|s| s.split(' ').map(str::to_string).collect())
                .unwrap_or_default(),
        }))
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshedToken, AuthError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self.http.post(&self.token_base).form(&params).send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(AuthError::ProviderUnavailable(format!(
                "token endpoint returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(map_token_error(response).await);
        }

        let tokens: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        let (Some(access_token), Some(expires_in)) = (tokens.access_token, tokens.expires_in)
        else {
            return Err(AuthError::MalformedResponse(
                "refresh response missing access_token or expires_in".to_string(),
            ));
        };

        Ok(RefreshedToken {
            access_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> GoogleAuthHandler {
        GoogleAuthHandler::new(
            "client-id".to_string(),
            "client-secret".to_string(),
            "https://app.example.com/api/credentials/oauth/callback?provider=GOOGLE".to_string(),
        )
    }

    #[test]
    fn test_auth_url_requests_offline_access() {
        let url = handler()
            .generate_auth_url(
                &["https://www.googleapis.com/auth/gmail.readonly".to_string()],
                "opaque-state",
            )
            .expect("url builds");

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(pairs.get("access_type").map(String::as_str), Some("offline"));
        assert_eq!(pairs.get("prompt").map(String::as_str), Some("consent"));
        assert_eq!(pairs.get("state").map(String::as_str), Some("opaque-state"));
        assert_eq!(
            pairs.get("scope").map(String::as_str),
            Some("https://www.googleapis.com/auth/gmail.readonly")
        );
    }

    #[test]
    fn test_auth_url_preserves_state_verbatim() {
        let state = "eyJ1c2VySWQiOiJhYmMifQ";
        let url = handler().generate_auth_url(&[], state).expect("url builds");
        assert!(url.query().unwrap().contains(&format!("state={}", state)));
    }
}
