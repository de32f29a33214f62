//! Provider registry
//!
//! In-memory registry mapping providers to their configuration and auth
//! handler capability. Populated once at process start and read-only
//! thereafter.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

use tracing::warn;

use crate::config::AppConfig;
use crate::providers::{
    ApiKeyField, ApiKeyProviderConfig, AuthHandler, AuthType, OAuthProviderConfig, Provider,
    ProviderConfig, firecrawl,
    google::{GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, GoogleAuthHandler},
    microsoft::{MICROSOFT_AUTH_URL, MICROSOFT_TOKEN_URL, MicrosoftAuthHandler},
    slack::{SLACK_AUTH_URL, SLACK_TOKEN_URL, SlackAuthHandler},
};

/// Error type for registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("provider '{name}' not found")]
    ProviderNotFound { name: String },
    #[error("provider '{name}' does not support OAuth2")]
    OAuthUnsupported { name: String },
}

/// Global registry instance, set once during startup
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Provider registry storing configurations and auth handlers
#[derive(Clone, Default)]
pub struct Registry {
    configs: HashMap<Provider, ProviderConfig>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            configs: HashMap::new(),
        }
    }

    /// Get the global registry. Panics if [`Registry::init_global`] has not
    /// run; services constructed at startup should hold their own clone.
    pub fn global() -> &'static Registry {
        REGISTRY.get().expect("provider registry not initialized")
    }

    /// Install the global registry instance. Later calls are ignored so test
    /// harnesses can initialize repeatedly.
    pub fn init_global(registry: Registry) -> &'static Registry {
        REGISTRY.get_or_init(|| registry)
    }

    /// Build the registry from application configuration. OAuth providers
    /// without client credentials are skipped with a warning; API-key
    /// providers are always available.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new();

        let callback = |provider: &str| {
            format!(
                "{}/credentials/oauth/callback?provider={}",
                config.public_api_url.trim_end_matches('/'),
                provider
            )
        };

        match (&config.google_client_id, &config.google_client_secret) {
            (Some(id), Some(secret)) => {
                let handler = Arc::new(GoogleAuthHandler::new(
                    id.clone(),
                    secret.clone(),
                    callback("GOOGLE"),
                ));
                registry.register(Provider::Google, google_oauth_config(handler));
            }
            _ => warn!("Google connector not registered: missing client credentials"),
        }

        match (&config.slack_client_id, &config.slack_client_secret) {
            (Some(id), Some(secret)) => {
                let handler = Arc::new(SlackAuthHandler::new(
                    id.clone(),
                    secret.clone(),
                    callback("SLACK"),
                ));
                registry.register(Provider::Slack, slack_oauth_config(handler));
            }
            _ => warn!("Slack connector not registered: missing client credentials"),
        }

        match (&config.microsoft_client_id, &config.microsoft_client_secret) {
            (Some(id), Some(secret)) => {
                // Microsoft rejects query strings in redirect URLs, hence the
                // path-based callback
                let redirect = format!(
                    "{}/credentials/oauth/microsoft/callback",
                    config.public_api_url.trim_end_matches('/')
                );
                let handler =
                    Arc::new(MicrosoftAuthHandler::new(id.clone(), secret.clone(), redirect));
                registry.register(Provider::Microsoft, microsoft_oauth_config(handler));
            }
            _ => warn!("Microsoft connector not registered: missing client credentials"),
        }

        registry.register(
            Provider::Firecrawl,
            ProviderConfig::ApiKey(firecrawl::api_key_config()),
        );
        registry.register(
            Provider::CustomApi,
            ProviderConfig::ApiKey(ApiKeyProviderConfig {
                fields: vec![
                    ApiKeyField {
                        name: "apiKey",
                        label: "API Key",
                        field_type: "password",
                        placeholder: "",
                        description: "API key for your custom service",
                    },
                    ApiKeyField {
                        name: "apiUrl",
                        label: "API URL",
                        field_type: "text",
                        placeholder: "https://api.example.com",
                        description: "Base URL of your custom service (optional)",
                    },
                ],
            }),
        );

        registry
    }

    /// Register a provider configuration
    pub fn register(&mut self, provider: Provider, config: ProviderConfig) {
        self.configs.insert(provider, config);
    }

    /// Get the configuration for a provider
    pub fn get_config(&self, provider: Provider) -> Result<&ProviderConfig, RegistryError> {
        self.configs
            .get(&provider)
            .ok_or_else(|| RegistryError::ProviderNotFound {
                name: provider.to_string(),
            })
    }

    /// Get the auth handler for an OAuth provider
    pub fn auth_handler(&self, provider: Provider) -> Result<Arc<dyn AuthHandler>, RegistryError> {
        match self.get_config(provider)? {
            ProviderConfig::OAuth(oauth) => Ok(Arc::clone(&oauth.handler)),
            ProviderConfig::ApiKey(_) => Err(RegistryError::OAuthUnsupported {
                name: provider.to_string(),
            }),
        }
    }

    /// Check whether a provider supports OAuth2 flows
    pub fn is_oauth_provider(&self, provider: Provider) -> bool {
        self.configs
            .get(&provider)
            .is_some_and(|config| config.auth_type() == AuthType::OAuth2)
    }

    /// Providers registered for OAuth2 flows, sorted for stable ordering
    pub fn oauth_providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self
            .configs
            .iter()
            .filter(|(_, config)| config.auth_type() == AuthType::OAuth2)
            .map(|(provider, _)| *provider)
            .collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }

    /// All registered providers with their auth types, sorted by name
    pub fn list(&self) -> Vec<(Provider, AuthType)> {
        let mut entries: Vec<(Provider, AuthType)> = self
            .configs
            .iter()
            .map(|(provider, config)| (*provider, config.auth_type()))
            .collect();
        entries.sort_by_key(|(p, _)| p.as_str());
        entries
    }
}

fn google_oauth_config(handler: Arc<dyn AuthHandler>) -> ProviderConfig {
    let mut scope_catalog = BTreeMap::new();
    scope_catalog.insert(
        "gmail",
        vec![
            "https://www.googleapis.com/auth/gmail.readonly".to_string(),
            "https://www.googleapis.com/auth/gmail.send".to_string(),
            "https://www.googleapis.com/auth/gmail.modify".to_string(),
        ],
    );
    scope_catalog.insert(
        "sheets",
        vec![
            "https://www.googleapis.com/auth/spreadsheets".to_string(),
            "https://www.googleapis.com/auth/drive.readonly".to_string(),
        ],
    );
    scope_catalog.insert(
        "calendar",
        vec![
            "https://www.googleapis.com/auth/calendar".to_string(),
            "https://www.googleapis.com/auth/calendar.events".to_string(),
        ],
    );
    scope_catalog.insert(
        "drive",
        vec![
            "https://www.googleapis.com/auth/drive".to_string(),
            "https://www.googleapis.com/auth/drive.file".to_string(),
        ],
    );

    ProviderConfig::OAuth(OAuthProviderConfig {
        auth_url: GOOGLE_AUTH_URL.to_string(),
        token_url: GOOGLE_TOKEN_URL.to_string(),
        scope_catalog,
        default_scopes: vec![
            "https://www.googleapis.com/auth/userinfo.email".to_string(),
            "https://www.googleapis.com/auth/userinfo.profile".to_string(),
        ],
        handler,
    })
}

fn slack_oauth_config(handler: Arc<dyn AuthHandler>) -> ProviderConfig {
    let mut scope_catalog = BTreeMap::new();
    scope_catalog.insert(
        "messaging",
        vec![
            "chat:write".to_string(),
            "chat:write.public".to_string(),
            "channels:read".to_string(),
        ],
    );
    scope_catalog.insert(
        "files",
        vec!["files:read".to_string(), "files:write".to_string()],
    );

    ProviderConfig::OAuth(OAuthProviderConfig {
        auth_url: SLACK_AUTH_URL.to_string(),
        token_url: SLACK_TOKEN_URL.to_string(),
        scope_catalog,
        default_scopes: vec!["chat:write".to_string(), "team:read".to_string()],
        handler,
    })
}

fn microsoft_oauth_config(handler: Arc<dyn AuthHandler>) -> ProviderConfig {
    let mut scope_catalog = BTreeMap::new();
    scope_catalog.insert(
        "mail",
        vec![
            "https://graph.microsoft.com/Mail.Read".to_string(),
            "https://graph.microsoft.com/Mail.Send".to_string(),
            "https://graph.microsoft.com/Mail.ReadWrite".to_string(),
        ],
    );
    scope_catalog.insert(
        "calendar",
        vec![
            "https://graph.microsoft.com/Calendars.Read".to_string(),
            "https://graph.microsoft.com/Calendars.ReadWrite".to_string(),
        ],
    );
    scope_catalog.insert(
        "onedrive",
        vec![
            "https://graph.microsoft.com/Files.Read".to_string(),
            "https://graph.microsoft.com/Files.ReadWrite".to_string(),
        ],
    );
    scope_catalog.insert(
        "contacts",
        vec![
            "https://graph.microsoft.com/Contacts.Read".to_string(),
            "https://graph.microsoft.com/Contacts.ReadWrite".to_string(),
        ],
    );

    ProviderConfig::OAuth(OAuthProviderConfig {
        auth_url: MICROSOFT_AUTH_URL.to_string(),
        token_url: MICROSOFT_TOKEN_URL.to_string(),
        scope_catalog,
        default_scopes: vec![
            "https://graph.microsoft.com/User.Read".to_string(),
            "offline_access".to_string(),
        ],
        handler,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> AppConfig {
        AppConfig {
            google_client_id: Some("google-id".to_string()),
            google_client_secret: Some("google-secret".to_string()),
            slack_client_id: Some("slack-id".to_string()),
            slack_client_secret: Some("slack-secret".to_string()),
            microsoft_client_id: Some("ms-id".to_string()),
            microsoft_client_secret: Some("ms-secret".to_string()),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_registry_unknown_provider() {
        let registry = Registry::new();
        let result = registry.get_config(Provider::Google);
        assert!(matches!(
            result,
            Err(RegistryError::ProviderNotFound { name }) if name == "GOOGLE"
        ));
    }

    #[test]
    fn test_full_config_registers_all_providers() {
        let registry = Registry::from_config(&configured());
        assert_eq!(registry.list().len(), 5);
        assert!(registry.is_oauth_provider(Provider::Google));
        assert!(registry.is_oauth_provider(Provider::Slack));
        assert!(registry.is_oauth_provider(Provider::Microsoft));
        assert!(!registry.is_oauth_provider(Provider::Firecrawl));
        assert!(!registry.is_oauth_provider(Provider::CustomApi));
    }

    #[test]
    fn test_unconfigured_oauth_providers_skipped() {
        let registry = Registry::from_config(&AppConfig::default());
        assert!(registry.get_config(Provider::Google).is_err());
        // API-key providers are always present
        assert!(registry.get_config(Provider::Firecrawl).is_ok());
    }

    #[test]
    fn test_auth_handler_requires_oauth_provider() {
        let registry = Registry::from_config(&configured());
        assert!(registry.auth_handler(Provider::Google).is_ok());
        assert!(matches!(
            registry.auth_handler(Provider::Firecrawl),
            Err(RegistryError::OAuthUnsupported { .. })
        ));
    }

    #[test]
    fn test_scopes_for_merges_catalog_groups() {
        let registry = Registry::from_config(&configured());
        let config = registry.get_config(Provider::Google).unwrap();
        let oauth = config.as_oauth().unwrap();

        let scopes = oauth.scopes_for(&["gmail".to_string(), "unknown".to_string()]);
        assert!(scopes.contains(&"https://www.googleapis.com/auth/userinfo.email".to_string()));
        assert!(scopes.contains(&"https://www.googleapis.com/auth/gmail.send".to_string()));
        // Unknown services are ignored, defaults retained
        assert!(scopes.len() >= 5);
    }

    #[test]
    fn test_oauth_providers_sorted() {
        let registry = Registry::from_config(&configured());
        let providers = registry.oauth_providers();
        assert_eq!(
            providers,
            vec![Provider::Google, Provider::Microsoft, Provider::Slack]
        );
    }
}
