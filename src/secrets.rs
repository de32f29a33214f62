//! Decrypted credential secret shapes.
//!
//! Secrets are stored encrypted as JSON and decoded into a provider-specific
//! variant immediately after decryption, keyed by the row's
//! `(credential_type, provider)` pair, so downstream code never handles an
//! untyped blob.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::providers::Provider;

/// Credential class stored alongside each row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialType {
    Oauth,
    ApiKey,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::Oauth => "OAUTH",
            CredentialType::ApiKey => "API_KEY",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input-shape validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unsupported {credential_type} provider '{provider}'")]
    UnsupportedProvider {
        credential_type: CredentialType,
        provider: Provider,
    },
    #[error("invalid secret shape for {provider}: {reason}")]
    InvalidShape { provider: Provider, reason: String },
    #[error("OAuth credentials may only be created through the callback flow")]
    OauthViaManualPath,
}

/// Google OAuth tokens. Refresh is always granted (`access_type=offline`),
/// so both the refresh token and expiry are mandatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleOAuthSecret {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

/// Slack bot tokens never expire and carry workspace identity instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackOAuthSecret {
    pub access_token: String,
    pub scopes: Vec<String>,
    pub team_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_user_id: Option<String>,
}

/// Microsoft may withhold the refresh token on re-authorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrosoftOAuthSecret {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirecrawlApiKeySecret {
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomApiKeySecret {
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

/// Decrypted credential payload, one variant per `(type, provider)` pair.
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialSecret {
    GoogleOAuth(GoogleOAuthSecret),
    SlackOAuth(SlackOAuthSecret),
    MicrosoftOAuth(MicrosoftOAuthSecret),
    FirecrawlApiKey(FirecrawlApiKeySecret),
    CustomApiKey(CustomApiKeySecret),
}

impl CredentialSecret {
    pub fn provider(&self) -> Provider {
        match self {
            CredentialSecret::GoogleOAuth(_) => Provider::Google,
            CredentialSecret::SlackOAuth(_) => Provider::Slack,
            CredentialSecret::MicrosoftOAuth(_) => Provider::Microsoft,
            CredentialSecret::FirecrawlApiKey(_) => Provider::Firecrawl,
            CredentialSecret::CustomApiKey(_) => Provider::CustomApi,
        }
    }

    pub fn credential_type(&self) -> CredentialType {
        match self {
            CredentialSecret::GoogleOAuth(_)
            | CredentialSecret::SlackOAuth(_)
            | CredentialSecret::MicrosoftOAuth(_) => CredentialType::Oauth,
            CredentialSecret::FirecrawlApiKey(_) | CredentialSecret::CustomApiKey(_) => {
                CredentialType::ApiKey
            }
        }
    }

    /// Access token for OAuth secrets; `None` for API keys.
    pub fn access_token(&self) -> Option<&str> {
        match self {
            CredentialSecret::GoogleOAuth(secret) => Some(&secret.access_token),
            CredentialSecret::SlackOAuth(secret) => Some(&secret.access_token),
            CredentialSecret::MicrosoftOAuth(secret) => Some(&secret.access_token),
            _ => None,
        }
    }

    pub fn refresh_token(&self) -> Option<&str> {
        match self {
            CredentialSecret::GoogleOAuth(secret) => Some(&secret.refresh_token),
            CredentialSecret::MicrosoftOAuth(secret) => secret.refresh_token.as_deref(),
            _ => None,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            CredentialSecret::GoogleOAuth(secret) => Some(secret.expires_at),
            CredentialSecret::MicrosoftOAuth(secret) => Some(secret.expires_at),
            _ => None,
        }
    }

    /// Rewrite the access token and expiry after a successful refresh.
    /// Non-refreshable variants are untouched.
    pub fn apply_refresh(&mut self, access_token: String, expires_at: DateTime<Utc>) {
        match self {
            CredentialSecret::GoogleOAuth(secret) => {
                secret.access_token = access_token;
                secret.expires_at = expires_at;
            }
            CredentialSecret::MicrosoftOAuth(secret) => {
                secret.access_token = access_token;
                secret.expires_at = expires_at;
            }
            _ => {}
        }
    }

    /// Serialize the provider-specific inner shape (no tag; the row's
    /// `(type, provider)` columns key the decode).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CredentialSecret::GoogleOAuth(secret) => serde_json::to_value(secret),
            CredentialSecret::SlackOAuth(secret) => serde_json::to_value(secret),
            CredentialSecret::MicrosoftOAuth(secret) => serde_json::to_value(secret),
            CredentialSecret::FirecrawlApiKey(secret) => serde_json::to_value(secret),
            CredentialSecret::CustomApiKey(secret) => serde_json::to_value(secret),
        }
        .expect("secret shapes serialize to JSON")
    }

    /// Decode and validate a secret against the declared `(type, provider)`.
    pub fn from_json(
        credential_type: CredentialType,
        provider: Provider,
        value: &serde_json::Value,
    ) -> Result<Self, ValidationError> {
        let invalid = |e: serde_json::Error| ValidationError::InvalidShape {
            provider,
            reason: e.to_string(),
        };

        match (credential_type, provider) {
            (CredentialType::Oauth, Provider::Google) => {
                let secret: GoogleOAuthSecret =
                    serde_json::from_value(value.clone()).map_err(invalid)?;
                Ok(CredentialSecret::GoogleOAuth(secret))
            }
            (CredentialType::Oauth, Provider::Slack) => {
                let secret: SlackOAuthSecret =
                    serde_json::from_value(value.clone()).map_err(invalid)?;
                Ok(CredentialSecret::SlackOAuth(secret))
            }
            (CredentialType::Oauth, Provider::Microsoft) => {
                let secret: MicrosoftOAuthSecret =
                    serde_json::from_value(value.clone()).map_err(invalid)?;
                Ok(CredentialSecret::MicrosoftOAuth(secret))
            }
            (CredentialType::ApiKey, Provider::Firecrawl) => {
                let secret: FirecrawlApiKeySecret =
                    serde_json::from_value(value.clone()).map_err(invalid)?;
                Ok(CredentialSecret::FirecrawlApiKey(secret))
            }
            (CredentialType::ApiKey, Provider::CustomApi) => {
                let secret: CustomApiKeySecret =
                    serde_json::from_value(value.clone()).map_err(invalid)?;
                Ok(CredentialSecret::CustomApiKey(secret))
            }
            (credential_type, provider) => Err(ValidationError::UnsupportedProvider {
                credential_type,
                provider,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn google_secret_json() -> serde_json::Value {
        json!({
            "accessToken": "ya29.token",
            "refreshToken": "1//refresh",
            "expiresAt": "2026-01-01T00:00:00Z",
            "scopes": ["https://www.googleapis.com/auth/gmail.readonly"],
        })
    }

    #[test]
    fn test_google_secret_round_trip() {
        let secret = CredentialSecret::from_json(
            CredentialType::Oauth,
            Provider::Google,
            &google_secret_json(),
        )
        .expect("valid google secret");

        assert_eq!(secret.provider(), Provider::Google);
        assert_eq!(secret.credential_type(), CredentialType::Oauth);
        assert_eq!(secret.access_token(), Some("ya29.token"));
        assert_eq!(secret.refresh_token(), Some("1//refresh"));
        assert!(secret.expires_at().is_some());

        let json = secret.to_json();
        let reparsed =
            CredentialSecret::from_json(CredentialType::Oauth, Provider::Google, &json).unwrap();
        assert_eq!(reparsed, secret);
    }

    #[test]
    fn test_slack_secret_has_no_expiry() {
        let value = json!({
            "accessToken": "xoxb-token",
            "scopes": ["chat:write"],
            "teamId": "T0123",
            "teamName": "Acme",
        });
        let secret =
            CredentialSecret::from_json(CredentialType::Oauth, Provider::Slack, &value).unwrap();
        assert_eq!(secret.expires_at(), None);
        assert_eq!(secret.refresh_token(), None);
    }

    #[test]
    fn test_microsoft_secret_refresh_token_optional() {
        let value = json!({
            "accessToken": "eyJ-token",
            "expiresAt": "2026-01-01T00:00:00Z",
            "scopes": ["https://graph.microsoft.com/Mail.Read"],
        });
        let secret =
            CredentialSecret::from_json(CredentialType::Oauth, Provider::Microsoft, &value)
                .unwrap();
        assert_eq!(secret.refresh_token(), None);
        assert!(secret.expires_at().is_some());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        // An API-key payload does not satisfy the Google OAuth shape
        let value = json!({"apiKey": "fc-123"});
        let result = CredentialSecret::from_json(CredentialType::Oauth, Provider::Google, &value);
        assert!(matches!(
            result,
            Err(ValidationError::InvalidShape { provider: Provider::Google, .. })
        ));
    }

    #[test]
    fn test_type_provider_pair_must_be_supported() {
        let result = CredentialSecret::from_json(
            CredentialType::ApiKey,
            Provider::Google,
            &json!({"apiKey": "not-a-google-auth"}),
        );
        assert!(matches!(
            result,
            Err(ValidationError::UnsupportedProvider { .. })
        ));
    }

    #[test]
    fn test_apply_refresh_rewrites_token_and_expiry() {
        let mut secret = CredentialSecret::from_json(
            CredentialType::Oauth,
            Provider::Google,
            &google_secret_json(),
        )
        .unwrap();

        let new_expiry = Utc::now() + chrono::Duration::hours(1);
        secret.apply_refresh("ya29.fresh".to_string(), new_expiry);

        assert_eq!(secret.access_token(), Some("ya29.fresh"));
        assert_eq!(secret.expires_at(), Some(new_expiry));
        // Refresh token survives a refresh
        assert_eq!(secret.refresh_token(), Some("1//refresh"));
    }
}
