//! Provider catalog and authentication capabilities.
//!
//! Each supported third-party service is described by a [`ProviderConfig`]:
//! either an OAuth2 configuration carrying an [`AuthHandler`] capability, or
//! an API-key configuration describing the fields a user submits manually.

pub mod firecrawl;
pub mod google;
pub mod microsoft;
pub mod registry;
pub mod slack;
pub mod state;
pub mod trait_;

pub use registry::{Registry, RegistryError};
pub use state::StateEnvelope;
pub use trait_::{AuthError, AuthHandler, RefreshedToken};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Third-party service a credential can be issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provider {
    Google,
    Slack,
    Microsoft,
    Firecrawl,
    CustomApi,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "GOOGLE",
            Provider::Slack => "SLACK",
            Provider::Microsoft => "MICROSOFT",
            Provider::Firecrawl => "FIRECRAWL",
            Provider::CustomApi => "CUSTOM_API",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GOOGLE" => Ok(Provider::Google),
            "SLACK" => Ok(Provider::Slack),
            "MICROSOFT" => Ok(Provider::Microsoft),
            "FIRECRAWL" => Ok(Provider::Firecrawl),
            "CUSTOM_API" => Ok(Provider::CustomApi),
            other => Err(RegistryError::ProviderNotFound {
                name: other.to_string(),
            }),
        }
    }
}

/// Authentication method supported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// OAuth 2.0 authorization code flow
    OAuth2,
    /// API key authentication
    ApiKey,
}

/// OAuth2 provider configuration with its auth handler capability
#[derive(Clone)]
pub struct OAuthProviderConfig {
    /// Authorization endpoint shown to registry consumers
    pub auth_url: String,
    /// Token endpoint used for exchange and refresh
    pub token_url: String,
    /// Scope groups keyed by the service they unlock (e.g. "gmail", "sheets")
    pub scope_catalog: BTreeMap<&'static str, Vec<String>>,
    /// Scopes requested when no services are selected
    pub default_scopes: Vec<String>,
    /// Handler implementing the three-step OAuth capability
    pub handler: Arc<dyn AuthHandler>,
}

impl OAuthProviderConfig {
    /// Resolve the scope set for the requested services, starting from the
    /// default scopes. Unknown services are ignored.
    pub fn scopes_for(&self, services: &[String]) -> Vec<String> {
        let mut scopes: Vec<String> = self.default_scopes.clone();
        for service in services {
            if let Some(group) = self.scope_catalog.get(service.as_str()) {
                for scope in group {
                    if !scopes.contains(scope) {
                        scopes.push(scope.clone());
                    }
                }
            }
        }
        scopes
    }
}

/// A single input field for manual API-key submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyField {
    pub name: &'static str,
    pub label: &'static str,
    /// Rendering hint for the UI collaborator ("password", "text", ...)
    pub field_type: &'static str,
    pub placeholder: &'static str,
    pub description: &'static str,
}

/// API-key provider configuration
#[derive(Debug, Clone)]
pub struct ApiKeyProviderConfig {
    pub fields: Vec<ApiKeyField>,
}

/// Tagged provider configuration
#[derive(Clone)]
pub enum ProviderConfig {
    OAuth(OAuthProviderConfig),
    ApiKey(ApiKeyProviderConfig),
}

impl ProviderConfig {
    pub fn auth_type(&self) -> AuthType {
        match self {
            ProviderConfig::OAuth(_) => AuthType::OAuth2,
            ProviderConfig::ApiKey(_) => AuthType::ApiKey,
        }
    }

    /// Borrow the OAuth configuration, if this provider uses OAuth2.
    pub fn as_oauth(&self) -> Option<&OAuthProviderConfig> {
        match self {
            ProviderConfig::OAuth(config) => Some(config),
            ProviderConfig::ApiKey(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trip() {
        for provider in [
            Provider::Google,
            Provider::Slack,
            Provider::Microsoft,
            Provider::Firecrawl,
            Provider::CustomApi,
        ] {
            let parsed: Provider = provider.as_str().parse().expect("parses back");
            assert_eq!(parsed, provider);
        }
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result = "HUBSPOT".parse::<Provider>();
        assert!(matches!(
            result,
            Err(RegistryError::ProviderNotFound { name }) if name == "HUBSPOT"
        ));
    }

    #[test]
    fn test_provider_serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&Provider::CustomApi).unwrap();
        assert_eq!(json, "\"CUSTOM_API\"");
    }
}
