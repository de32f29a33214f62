//! Slack OAuth handler
//!
//! Slack's v2 flow: comma-joined scopes on the authorize URL and an
//! `oauth.v2.access` exchange that reports failures inside an `ok:false`
//! envelope. Bot tokens never expire, so refresh is unsupported.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::providers::trait_::{AuthError, AuthHandler, RefreshedToken};
use crate::secrets::{CredentialSecret, SlackOAuthSecret};

pub const SLACK_AUTH_URL: &str = "https://slack.com/oauth/v2/authorize";
pub const SLACK_TOKEN_URL: &str = "https://slack.com/api/oauth.v2.access";

/// Slack OAuth handler
pub struct SlackAuthHandler {
    client_id: String,
    client_secret: String,
    redirect_url: String,
    auth_base: String,
    token_base: String,
    http: reqwest::Client,
}

impl SlackAuthHandler {
    pub fn new(client_id: String, client_secret: String, redirect_url: String) -> Self {
        Self::with_endpoints(
            client_id,
            client_secret,
            redirect_url,
            SLACK_AUTH_URL.to_string(),
            SLACK_TOKEN_URL.to_string(),
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
struct SlackTeam {
    id: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackAccessResponse {
    ok: bool,
    error: Option<String>,
    access_token: Option<String>,
    scope: Option<String>,
    token_type: Option<String>,
    bot_user_id: Option<String>,
    team: Option<SlackTeam>,
}

#[async_trait]
impl AuthHandler for SlackAuthHandler {
    fn generate_auth_url(&self, scopes: &[String], state: &str) -> Result<Url, AuthError> {
        let mut url = Url::parse(&self.auth_base)
            .map_err(|e| AuthError::MalformedResponse(format!("bad auth base url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("scope", &scopes.join(","))
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("state", state);
        Ok(url)
    }

    async fn handle_callback(&self, code: &str) -> Result<CredentialSecret, AuthError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_url.as_str()),
        ];

        let response = self.http.post(&self.token_base).form(&params).send().await?;
        if response.status().is_server_error() {
            return Err(AuthError::ProviderUnavailable(format!(
                "oauth.v2.access returned {}",
                response.status()
            )));
        }

        let data: SlackAccessResponse = response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        if !data.ok {
            // Slack signals single-use-code violations and bad codes the
            // same way; surface them as invalid-code either way.
            return Err(AuthError::InvalidCode(
                data.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }

        let (Some(access_token), Some(team)) = (data.access_token, data.team) else {
            return Err(AuthError::MalformedResponse(
                "oauth.v2.access response missing access_token or team".to_string(),
            ));
        };

        Ok(CredentialSecret::SlackOAuth(SlackOAuthSecret {
            access_token,
            scopes: data
                .scope
                .map(|s| s.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
            team_id: team.id,
            team_name: team.name,
            token_type: data.token_type,
            bot_user_id: data.bot_user_id,
        }))
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<RefreshedToken, AuthError> {
        // Slack bot tokens do not expire
        Err(AuthError::UnsupportedOperation)
    }
}
