//! Microsoft OAuth handler
//!
//! Authorization-code flow against the common (multi-tenant) v2.0 endpoints.
//! `offline_access` is always appended so refresh tokens are issued, but
//! Microsoft may withhold the refresh token on re-authorization; the secret
//! shape tolerates that.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::providers::trait_::{AuthError, AuthHandler, RefreshedToken};
use crate::secrets::{CredentialSecret, MicrosoftOAuthSecret};

pub const MICROSOFT_AUTH_URL: &str =
    "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
pub const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// Microsoft OAuth handler
pub struct MicrosoftAuthHandler {
    client_id: String,
    client_secret: String,
    redirect_url: String,
    auth_base: String,
    token_base: String,
    http: reqwest::Client,
}

impl MicrosoftAuthHandler {
    pub fn new(client_id: String, client_secret: String, redirect_url: String) -> Self {
        Self::with_endpoints(
            client_id,
            client_secret,
            redirect_url,
            MICROSOFT_AUTH_URL.to_string(),
            MICROSOFT_TOKEN_URL.to_string(),
        )
    }

    /// Construct a handler against alternative endpoints (used by tests).
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
struct MicrosoftTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn map_error(status: StatusCode, tokens: &MicrosoftTokenResponse) -> AuthError {
    if status.is_server_error() {
        return AuthError::ProviderUnavailable(format!("token endpoint returned {}", status));
    }
    let code = tokens.error.clone().unwrap_or_default();
    if code == "invalid_grant" {
        return AuthError::InvalidCode(
            tokens
                .error_description
                .clone()
                .unwrap_or_else(|| code.clone()),
        );
    }
    AuthError::InvalidCode(format!("token endpoint rejected request ({})", status))
}

#[async_trait]
impl AuthHandler for MicrosoftAuthHandler {
    fn generate_auth_url(&self, scopes: &[String], state: &str) -> Result<Url, AuthError> {
        // offline_access must be present for a refresh token to be issued
        let mut scopes: Vec<String> = scopes.to_vec();
        if !scopes.iter().any(|s| s == "offline_access") {
            scopes.push("offline_access".to_string());
        }

        let mut url = Url::parse(&self.auth_base)
            .map_err(|e| AuthError::MalformedResponse(format!("bad auth base url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("response_mode", "query")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("prompt", "consent")
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
        let status = response.status();
        let tokens: MicrosoftTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        if !status.is_success() {
            return Err(map_error(status, &tokens));
        }

        let (Some(access_token), Some(expires_in)) =
            (tokens.access_token.clone(), tokens.expires_in)
        else {
            return Err(AuthError::MalformedResponse(
                "incomplete token data from Microsoft: missing access_token or expires_in"
                    .to_string(),
            ));
        };

        if tokens.refresh_token.is_none() {
            warn!("Microsoft did not return a refresh token; this can happen on re-authorization");
        }

        Ok(CredentialSecret::MicrosoftOAuth(MicrosoftOAuthSecret {
            access_token,
            refresh_token: tokens.refresh_token,
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
        let tokens: MicrosoftTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        if !status.is_success() {
            return Err(map_error(status, &tokens));
        }

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

    fn handler() -> MicrosoftAuthHandler {
        MicrosoftAuthHandler::new(
            "client-id".to_string(),
            "client-secret".to_string(),
            "https://app.example.com/api/credentials/oauth/microsoft/callback".to_string(),
        )
    }

    #[test]
    fn test_auth_url_appends_offline_access() {
        let url = handler()
            .generate_auth_url(
                &["https://graph.microsoft.com/Mail.Read".to_string()],
                "state-token",
            )
            .expect("url builds");

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        let scope = pairs.get("scope").expect("scope present");
        assert!(scope.contains("offline_access"));
        assert!(scope.contains("https://graph.microsoft.com/Mail.Read"));
        assert_eq!(pairs.get("prompt").map(String::as_str), Some("consent"));
    }

    #[test]
    fn test_auth_url_does_not_duplicate_offline_access() {
        let url = handler()
            .generate_auth_url(&["offline_access".to_string()], "s")
            .expect("url builds");
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs.get("scope").map(String::as_str),
            Some("offline_access")
        );
    }
}
