//! Shared helpers for integration tests: in-memory SQLite with migrations
//! applied, codec keys, and registries pointed at mock provider endpoints.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use duramation::crypto::CryptoKey;
use duramation::providers::{
    OAuthProviderConfig, Provider, ProviderConfig, Registry, google::GoogleAuthHandler,
};
use duramation::repositories::CredentialRepository;
use duramation::secrets::{CredentialSecret, GoogleOAuthSecret};
use migration::{Migrator, MigratorTrait};

/// Fresh in-memory database with the schema applied. A single pooled
/// connection keeps every query on the same SQLite memory instance.
pub async fn setup_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opt)
        .await
        .expect("connect to in-memory sqlite");
    Migrator::up(&db, None).await.expect("apply migrations");
    db
}

pub fn test_key() -> CryptoKey {
    CryptoKey::new(vec![42u8; 32]).expect("valid test key")
}

pub fn credential_repo(db: &DatabaseConnection) -> CredentialRepository {
    CredentialRepository::new(Arc::new(db.clone()), test_key())
}

/// Registry with a Google handler whose token endpoint points at a mock
/// server, so refresh traffic can be observed and counted.
pub fn registry_with_google(mock_base: &str) -> Registry {
    let handler = Arc::new(GoogleAuthHandler::with_endpoints(
        "test-client-id".to_string(),
        "test-client-secret".to_string(),
        "https://app.example.com/api/credentials/oauth/callback?provider=GOOGLE".to_string(),
        format!("{}/auth", mock_base),
        format!("{}/token", mock_base),
    ));

    let mut registry = Registry::new();
    registry.register(
        Provider::Google,
        ProviderConfig::OAuth(OAuthProviderConfig {
            auth_url: format!("{}/auth", mock_base),
            token_url: format!("{}/token", mock_base),
            scope_catalog: BTreeMap::new(),
            default_scopes: Vec::new(),
            handler,
        }),
    );
    registry
}

/// A Google OAuth secret expiring at the given instant
pub fn google_secret(access_token: &str, expires_at: DateTime<Utc>) -> CredentialSecret {
    CredentialSecret::GoogleOAuth(GoogleOAuthSecret {
        access_token: access_token.to_string(),
        refresh_token: "test-refresh-token".to_string(),
        expires_at,
        scopes: vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()],
    })
}
