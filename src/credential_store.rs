//! # Credential Store
//!
//! Owns the credential lifecycle: validated creation, safe listing,
//! deletion, and the hot path consumed by workflow execution —
//! `resolve`, which decrypts every credential linked to a workflow and
//! refreshes any OAuth token nearing expiry before returning it.
//!
//! Refresh-on-read is single-flight per credential: concurrent resolves
//! that would refresh the same credential serialize behind a keyed async
//! mutex, the winner persists the new token, and waiters re-read the row
//! instead of issuing a second provider call. Callers touching different
//! credentials never block each other.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::credential;
use crate::providers::{AuthError, Provider, Registry};
use crate::repositories::CredentialRepository;
use crate::secrets::{CredentialSecret, CredentialType, ValidationError};

/// Credential resolution failures
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential for {provider} is expired and could not be refreshed")]
    Expired { provider: Provider },
    #[error("credential for {provider} failed to decrypt")]
    Corrupted { provider: Provider },
    #[error("no credential linked for required provider {provider}")]
    Missing { provider: Provider },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Errors from the credential create paths
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Create request accepted by the manual path and the workflow-scoped path
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialCreateRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
    pub provider: Provider,
    /// Provider-specific secret payload, validated against `(type, provider)`
    pub secret: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

/// Credential projection with the secret stripped, for listings
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SafeCredential {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub user_id: Uuid,
    pub provider: String,
    #[serde(rename = "type")]
    pub credential_type: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    /// Display-only: whether the credential is currently usable
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<credential::Model> for SafeCredential {
    fn from(model: credential::Model) -> Self {
        let expires_at: Option<DateTime<Utc>> =
            model.expires_at.map(|dt| dt.with_timezone(&Utc));
        let is_valid = model.last_refresh_error.is_none()
            && expires_at.is_none_or(|exp| exp > Utc::now());
        Self {
            id: model.id,
            user_id: model.user_id,
            provider: model.provider,
            credential_type: model.credential_type,
            name: model.name,
            config: model.config,
            is_valid,
            expires_at,
            error: model.last_refresh_error,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

/// Decrypted credential handed to workflow execution
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub id: Uuid,
    pub provider: Provider,
    pub credential_type: CredentialType,
    pub name: String,
    pub secret: CredentialSecret,
    /// Set when a refresh failed and the last-known-good token is returned
    pub stale_warning: bool,
}

/// Credential lifecycle service
pub struct CredentialStore {
    repo: CredentialRepository,
    registry: Registry,
    /// Refresh tokens expiring within this window ahead of now
    refresh_lead_time: Duration,
    /// Single-flight arena keyed by credential id
    refresh_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl CredentialStore {
    pub fn new(repo: CredentialRepository, registry: Registry, lead_time_seconds: u64) -> Self {
        Self {
            repo,
            registry,
            refresh_lead_time: Duration::seconds(lead_time_seconds as i64),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Store a credential submitted through the manual path. OAuth
    /// credentials are rejected outright: they may only be created via the
    /// callback flow, which is the sole place a provider-issued token can
    /// legitimately come from.
    pub async fn store(
        &self,
        user_id: &Uuid,
        request: CredentialCreateRequest,
    ) -> Result<SafeCredential, StoreError> {
        if request.credential_type == CredentialType::Oauth {
            return Err(ValidationError::OauthViaManualPath.into());
        }

        let secret = CredentialSecret::from_json(
            request.credential_type,
            request.provider,
            &request.secret,
        )?;

        let model = self
            .repo
            .upsert(user_id, &request.name, &secret, request.config)
            .await?;

        info!(credential_id = %model.id, provider = %request.provider, "Stored credential");
        Ok(model.into())
    }

    /// Store a credential and atomically link it to a workflow
    pub async fn store_for_workflow(
        &self,
        user_id: &Uuid,
        workflow_id: &Uuid,
        request: CredentialCreateRequest,
    ) -> Result<SafeCredential, StoreError> {
        if request.credential_type == CredentialType::Oauth {
            return Err(ValidationError::OauthViaManualPath.into());
        }

        let secret = CredentialSecret::from_json(
            request.credential_type,
            request.provider,
            &request.secret,
        )?;

        let model = self
            .repo
            .upsert_for_workflow(user_id, workflow_id, &request.name, &secret, request.config)
            .await?;

        info!(
            credential_id = %model.id,
            workflow_id = %workflow_id,
            "Stored credential and linked to workflow"
        );
        Ok(model.into())
    }

    /// Store a secret obtained from an OAuth callback exchange, optionally
    /// linking it to the workflow the flow was started for. Upserts by
    /// `(user, name)` so re-connecting replaces the secret in place.
    pub async fn store_from_callback(
        &self,
        user_id: &Uuid,
        secret: CredentialSecret,
        workflow_id: Option<&Uuid>,
    ) -> Result<SafeCredential, StoreError> {
        let name = format!("{} Integration", secret.provider());
        let config = serde_json::json!({ "scopes": scopes_of(&secret) });

        let model = match workflow_id {
            Some(workflow_id) => {
                self.repo
                    .upsert_for_workflow(user_id, workflow_id, &name, &secret, Some(config))
                    .await?
            }
            None => self.repo.upsert(user_id, &name, &secret, Some(config)).await?,
        };

        info!(
            credential_id = %model.id,
            provider = %secret.provider(),
            linked = workflow_id.is_some(),
            "Stored OAuth credential from callback"
        );
        Ok(model.into())
    }

    /// List a user's credentials with secrets stripped
    pub async fn list_for_user(&self, user_id: &Uuid) -> Result<Vec<SafeCredential>, StoreError> {
        let models = self.repo.list_for_user(user_id).await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    /// Delete a credential the user owns; links cascade. Returns false when
    /// the credential does not exist or belongs to someone else.
    pub async fn delete(&self, credential_id: &Uuid, user_id: &Uuid) -> Result<bool, StoreError> {
        Ok(self.repo.delete(credential_id, user_id).await?)
    }

    /// Link an existing credential to a workflow after an ownership check
    pub async fn link_to_workflow(
        &self,
        user_id: &Uuid,
        workflow_id: &Uuid,
        credential_id: &Uuid,
    ) -> Result<bool, StoreError> {
        let Some(_) = self.repo.find_by_id_for_user(credential_id, user_id).await? else {
            return Ok(false);
        };
        self.repo.link_to_workflow(workflow_id, credential_id).await?;
        Ok(true)
    }

    /// The hot path: decrypt every credential linked to the workflow,
    /// refreshing stale OAuth tokens just in time.
    ///
    /// Failure semantics: a credential that fails to decrypt is excluded
    /// with a warning unless its provider is strictly required, in which
    /// case the whole resolution fails. A failed refresh degrades to the
    /// last-known-good token with `stale_warning` set, unless the token is
    /// already past expiry.
    #[instrument(skip_all, fields(workflow_id = %workflow_id))]
    pub async fn resolve(
        &self,
        workflow_id: &Uuid,
        required_providers: &[Provider],
    ) -> Result<Vec<ResolvedCredential>, CredentialError> {
        let linked = self
            .repo
            .find_linked_to_workflow(workflow_id)
            .await
            .map_err(CredentialError::Storage)?;

        let mut resolved = Vec::with_capacity(linked.len());

        for model in linked {
            let provider: Provider = match model.provider.parse() {
                Ok(provider) => provider,
                Err(_) => {
                    warn!(credential_id = %model.id, provider = %model.provider,
                        "Skipping credential with unknown provider");
                    continue;
                }
            };

            let secret = match self.repo.decrypt(&model) {
                Ok(secret) => secret,
                Err(err) => {
                    counter!("credential_decrypt_failures_total").increment(1);
                    warn!(credential_id = %model.id, error = %err, "Credential failed to decrypt");
                    if required_providers.contains(&provider) {
                        return Err(CredentialError::Corrupted { provider });
                    }
                    continue;
                }
            };

            let entry = if self.needs_refresh(&secret, Utc::now()) {
                self.refresh_single_flight(&model, provider).await?
            } else {
                ResolvedCredential {
                    id: model.id,
                    provider,
                    credential_type: secret.credential_type(),
                    name: model.name.clone(),
                    secret,
                    stale_warning: false,
                }
            };
            resolved.push(entry);
        }

        for provider in required_providers {
            if !resolved.iter().any(|c| c.provider == *provider) {
                return Err(CredentialError::Missing {
                    provider: *provider,
                });
            }
        }

        debug!(count = resolved.len(), "Resolved workflow credentials");
        Ok(resolved)
    }

    fn needs_refresh(&self, secret: &CredentialSecret, now: DateTime<Utc>) -> bool {
        match secret.expires_at() {
            Some(expires_at) => expires_at <= now + self.refresh_lead_time,
            None => false,
        }
    }

    /// Refresh a credential behind its per-id mutex. The winner performs
    /// the provider call and persists; waiters observe the refreshed row.
    async fn refresh_single_flight(
        &self,
        model: &credential::Model,
        provider: Provider,
    ) -> Result<ResolvedCredential, CredentialError> {
        let lock = {
            let mut locks = self.refresh_locks.lock().await;
            Arc::clone(locks.entry(model.id).or_default())
        };
        let _guard = lock.lock().await;

        // Re-read under the lock: a concurrent caller may have refreshed
        // while this one waited
        let current = self
            .repo
            .find_by_id(&model.id)
            .await
            .map_err(CredentialError::Storage)?
            .ok_or(CredentialError::Missing { provider })?;

        let secret = match self.repo.decrypt(&current) {
            Ok(secret) => secret,
            Err(_) => return Err(CredentialError::Corrupted { provider }),
        };

        let now = Utc::now();
        if !self.needs_refresh(&secret, now) {
            debug!(credential_id = %model.id, "Token already refreshed by concurrent resolve");
            return Ok(ResolvedCredential {
                id: current.id,
                provider,
                credential_type: secret.credential_type(),
                name: current.name,
                secret,
                stale_warning: false,
            });
        }

        let Some(refresh_token) = secret.refresh_token().map(str::to_string) else {
            // Nothing to refresh with; usable until the token actually lapses
            if secret.expires_at().is_some_and(|exp| exp <= now) {
                return Err(CredentialError::Expired { provider });
            }
            debug!(credential_id = %model.id, "No refresh token, returning token as-is");
            return Ok(ResolvedCredential {
                id: current.id,
                provider,
                credential_type: secret.credential_type(),
                name: current.name,
                secret,
                stale_warning: false,
            });
        };

        let refresh_started = std::time::Instant::now();
        match self.refresh_with_retry(provider, &refresh_token).await {
            Ok(refreshed) => {
                let mut secret = secret;
                secret.apply_refresh(refreshed.access_token, refreshed.expires_at);
                self.repo
                    .update_secret(&current.id, &current.user_id, &secret)
                    .await
                    .map_err(CredentialError::Storage)?;

                histogram!("credential_refresh_latency_ms")
                    .record(refresh_started.elapsed().as_secs_f64() * 1_000.0);
                counter!("credential_refresh_success_total", "provider" => provider.as_str())
                    .increment(1);
                info!(credential_id = %current.id, provider = %provider, "Refreshed credential");

                Ok(ResolvedCredential {
                    id: current.id,
                    provider,
                    credential_type: secret.credential_type(),
                    name: current.name,
                    secret,
                    stale_warning: false,
                })
            }
            Err(err) => {
                counter!("credential_refresh_failure_total", "provider" => provider.as_str())
                    .increment(1);
                warn!(
                    credential_id = %current.id,
                    provider = %provider,
                    error = %err,
                    "Token refresh failed"
                );
                if let Err(db_err) = self
                    .repo
                    .record_refresh_error(&current.id, &err.to_string())
                    .await
                {
                    warn!(error = %db_err, "Failed to record refresh error");
                }

                if secret.expires_at().is_some_and(|exp| exp <= Utc::now()) {
                    return Err(CredentialError::Expired { provider });
                }

                // Token is still inside its validity window: degrade to the
                // last-known-good token with a warning flag
                Ok(ResolvedCredential {
                    id: current.id,
                    provider,
                    credential_type: secret.credential_type(),
                    name: current.name,
                    secret,
                    stale_warning: true,
                })
            }
        }
    }

    /// One best-effort retry on transient refresh failures. Invalid-grant
    /// and unsupported-operation failures are not retried.
    async fn refresh_with_retry(
        &self,
        provider: Provider,
        refresh_token: &str,
    ) -> Result<crate::providers::RefreshedToken, AuthError> {
        let handler = self
            .registry
            .auth_handler(provider)
            .map_err(|_| AuthError::UnsupportedOperation)?;

        match handler.refresh_token(refresh_token).await {
            Ok(refreshed) => Ok(refreshed),
            Err(AuthError::ProviderUnavailable(first_error)) => {
                debug!(provider = %provider, error = %first_error, "Retrying token refresh once");
                counter!("credential_refresh_retries_total").increment(1);
                handler.refresh_token(refresh_token).await
            }
            Err(err) => Err(err),
        }
    }
}

fn scopes_of(secret: &CredentialSecret) -> Vec<String> {
    match secret {
        CredentialSecret::GoogleOAuth(s) => s.scopes.clone(),
        CredentialSecret::SlackOAuth(s) => s.scopes.clone(),
        CredentialSecret::MicrosoftOAuth(s) => s.scopes.clone(),
        _ => Vec::new(),
    }
}
