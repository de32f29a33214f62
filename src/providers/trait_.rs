//! Auth handler trait definition
//!
//! Defines the capability every OAuth provider implementation must satisfy:
//! authorization URL construction, code exchange, and token refresh.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

use crate::secrets::CredentialSecret;

/// Authentication errors surfaced by provider handlers and token issuing
#[derive(Debug, Error)]
pub enum AuthError {
    /// The authorization code was rejected (invalid, expired, or already used)
    #[error("authorization code rejected by provider: {0}")]
    InvalidCode(String),
    /// The provider's token endpoint is unreachable or failing
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// The provider does not support this operation (e.g. non-expiring tokens)
    #[error("operation not supported by this provider")]
    UnsupportedOperation,
    /// The caller is not allowed to perform the requested operation
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The provider returned a response the handler could not interpret
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        // Strip URLs so provider hosts never leak into user-visible messages
        AuthError::ProviderUnavailable(format!("request failed: {}", error.without_url()))
    }
}

/// Result of a successful token refresh
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Capability set every OAuth provider must implement.
///
/// URL generation is deterministic from registry configuration and performs
/// no I/O; exchange and refresh talk to the provider's token endpoint.
#[async_trait]
pub trait AuthHandler: Send + Sync {
    /// Build the authorization URL, embedding `state` unmodified so the
    /// callback can recover it. Implementations must request offline or
    /// refresh-capable access where the provider supports it.
    fn generate_auth_url(&self, scopes: &[String], state: &str) -> Result<Url, AuthError>;

    /// Exchange an authorization code for a decrypted credential secret.
    /// Codes are single-use: a retried exchange surfaces the provider's
    /// invalid-grant error instead of being swallowed.
    async fn handle_callback(&self, code: &str) -> Result<CredentialSecret, AuthError>;

    /// Refresh an access token. Providers whose tokens never expire return
    /// [`AuthError::UnsupportedOperation`] rather than fabricate a token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshedToken, AuthError>;
}
