//! Credential repository for database operations
//!
//! Persists credentials with their secrets encrypted, maintains the
//! workflow-credential links, and keeps the denormalized expiry column in
//! step with the decrypted secret.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait, sea_query::OnConflict,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{CodecError, CryptoKey, decrypt_secret, encrypt_secret};
use crate::models::credential::{self, Entity as Credential};
use crate::models::workflow_credential::{self, Entity as WorkflowCredential};
use crate::secrets::{CredentialSecret, CredentialType};

/// Repository for credential database operations
#[derive(Clone)]
pub struct CredentialRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    /// Codec key for secret encryption
    pub crypto_key: CryptoKey,
}

impl CredentialRepository {
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Upsert a credential by `(user_id, name)`, encrypting the secret.
    /// Re-connecting a provider under the same name replaces the secret.
    pub async fn upsert(
        &self,
        user_id: &Uuid,
        name: &str,
        secret: &CredentialSecret,
        config: Option<serde_json::Value>,
    ) -> Result<credential::Model> {
        let ciphertext = encrypt_secret(&self.crypto_key, user_id, secret)
            .map_err(|e| anyhow!("secret encryption failed: {}", e))?;
        let now = Utc::now();

        let existing = Credential::find()
            .filter(credential::Column::UserId.eq(*user_id))
            .filter(credential::Column::Name.eq(name))
            .one(&*self.db)
            .await?;

        let id = match existing {
            Some(model) => {
                let mut active: credential::ActiveModel = model.into();
                active.provider = Set(secret.provider().as_str().to_string());
                active.credential_type = Set(secret.credential_type().as_str().to_string());
                active.secret_ciphertext = Set(ciphertext);
                active.config = Set(config);
                active.expires_at = Set(secret.expires_at().map(Into::into));
                active.last_refresh_error = Set(None);
                active.updated_at = Set(now.into());
                let updated = active.update(&*self.db).await?;
                updated.id
            }
            None => {
                let id = Uuid::new_v4();
                let active = credential::ActiveModel {
                    id: Set(id),
                    user_id: Set(*user_id),
                    provider: Set(secret.provider().as_str().to_string()),
                    credential_type: Set(secret.credential_type().as_str().to_string()),
                    name: Set(name.to_string()),
                    secret_ciphertext: Set(ciphertext),
                    config: Set(config),
                    expires_at: Set(secret.expires_at().map(Into::into)),
                    last_refresh_error: Set(None),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                };
                active.insert(&*self.db).await?;
                id
            }
        };

        let fetched = Credential::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("credential not persisted"))
    }

    /// Upsert a credential and link it to a workflow in one transaction
    pub async fn upsert_for_workflow(
        &self,
        user_id: &Uuid,
        workflow_id: &Uuid,
        name: &str,
        secret: &CredentialSecret,
        config: Option<serde_json::Value>,
    ) -> Result<credential::Model> {
        let txn = self.db.begin().await?;

        let model = {
            let ciphertext = encrypt_secret(&self.crypto_key, user_id, secret)
                .map_err(|e| anyhow!("secret encryption failed: {}", e))?;
            let now = Utc::now();

            let existing = Credential::find()
                .filter(credential::Column::UserId.eq(*user_id))
                .filter(credential::Column::Name.eq(name))
                .one(&txn)
                .await?;

            match existing {
                Some(model) => {
                    let mut active: credential::ActiveModel = model.into();
                    active.provider = Set(secret.provider().as_str().to_string());
                    active.credential_type = Set(secret.credential_type().as_str().to_string());
                    active.secret_ciphertext = Set(ciphertext);
                    active.config = Set(config);
                    active.expires_at = Set(secret.expires_at().map(Into::into));
                    active.last_refresh_error = Set(None);
                    active.updated_at = Set(now.into());
                    active.update(&txn).await?
                }
                None => {
                    let active = credential::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        user_id: Set(*user_id),
                        provider: Set(secret.provider().as_str().to_string()),
                        credential_type: Set(secret.credential_type().as_str().to_string()),
                        name: Set(name.to_string()),
                        secret_ciphertext: Set(ciphertext),
                        config: Set(config),
                        expires_at: Set(secret.expires_at().map(Into::into)),
                        last_refresh_error: Set(None),
                        created_at: Set(now.into()),
                        updated_at: Set(now.into()),
                    };
                    let id = active.id.clone().unwrap();
                    active.insert(&txn).await?;
                    Credential::find_by_id(id)
                        .one(&txn)
                        .await?
                        .ok_or_else(|| anyhow!("credential not persisted"))?
                }
            }
        };

        let link = workflow_credential::ActiveModel {
            workflow_id: Set(*workflow_id),
            credential_id: Set(model.id),
            created_at: Set(Utc::now().into()),
        };
        WorkflowCredential::insert(link)
            .on_conflict(
                OnConflict::columns([
                    workflow_credential::Column::WorkflowId,
                    workflow_credential::Column::CredentialId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        txn.commit().await?;
        Ok(model)
    }

    /// Link an existing credential to a workflow (idempotent)
    pub async fn link_to_workflow(&self, workflow_id: &Uuid, credential_id: &Uuid) -> Result<()> {
        let link = workflow_credential::ActiveModel {
            workflow_id: Set(*workflow_id),
            credential_id: Set(*credential_id),
            created_at: Set(Utc::now().into()),
        };
        WorkflowCredential::insert(link)
            .on_conflict(
                OnConflict::columns([
                    workflow_credential::Column::WorkflowId,
                    workflow_credential::Column::CredentialId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;
        Ok(())
    }

    /// Find a credential by id without ownership scoping
    pub async fn find_by_id(&self, id: &Uuid) -> Result<Option<credential::Model>> {
        Ok(Credential::find_by_id(*id).one(&*self.db).await?)
    }

    /// Find a credential by id, scoped to its owner
    pub async fn find_by_id_for_user(
        &self,
        id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<credential::Model>> {
        Ok(Credential::find_by_id(*id)
            .filter(credential::Column::UserId.eq(*user_id))
            .one(&*self.db)
            .await?)
    }

    /// List all credentials owned by a user, oldest first
    pub async fn list_for_user(&self, user_id: &Uuid) -> Result<Vec<credential::Model>> {
        Ok(Credential::find()
            .filter(credential::Column::UserId.eq(*user_id))
            .order_by_asc(credential::Column::CreatedAt)
            .order_by_asc(credential::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// List the credentials linked to a workflow
    pub async fn find_linked_to_workflow(
        &self,
        workflow_id: &Uuid,
    ) -> Result<Vec<credential::Model>> {
        let links = WorkflowCredential::find()
            .filter(workflow_credential::Column::WorkflowId.eq(*workflow_id))
            .all(&*self.db)
            .await?;

        let ids: Vec<Uuid> = links.iter().map(|link| link.credential_id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        Ok(Credential::find()
            .filter(credential::Column::Id.is_in(ids))
            .order_by_asc(credential::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Decrypt a credential row into its typed secret
    pub fn decrypt(&self, model: &credential::Model) -> Result<CredentialSecret, CodecError> {
        let provider = model
            .provider
            .parse()
            .map_err(|_| CodecError::DecryptionFailed(format!(
                "unknown provider '{}'",
                model.provider
            )))?;
        let credential_type = match model.credential_type.as_str() {
            "OAUTH" => CredentialType::Oauth,
            "API_KEY" => CredentialType::ApiKey,
            other => {
                return Err(CodecError::DecryptionFailed(format!(
                    "unknown credential type '{}'",
                    other
                )));
            }
        };
        decrypt_secret(
            &self.crypto_key,
            &model.user_id,
            provider,
            credential_type,
            &model.secret_ciphertext,
        )
    }

    /// Rewrite the secret after a token refresh, syncing the expiry column
    /// and clearing any recorded refresh error
    pub async fn update_secret(
        &self,
        credential_id: &Uuid,
        user_id: &Uuid,
        secret: &CredentialSecret,
    ) -> Result<credential::Model> {
        let ciphertext = encrypt_secret(&self.crypto_key, user_id, secret)
            .map_err(|e| anyhow!("secret encryption failed: {}", e))?;

        let active = credential::ActiveModel {
            id: Set(*credential_id),
            secret_ciphertext: Set(ciphertext),
            expires_at: Set(secret.expires_at().map(Into::into)),
            last_refresh_error: Set(None),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };
        Ok(active.update(&*self.db).await?)
    }

    /// Record a refresh failure for dashboard display
    pub async fn record_refresh_error(&self, credential_id: &Uuid, error: &str) -> Result<()> {
        let active = credential::ActiveModel {
            id: Set(*credential_id),
            last_refresh_error: Set(Some(error.to_string())),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };
        active.update(&*self.db).await?;
        Ok(())
    }

    /// Delete a credential owned by the user. Links cascade via the schema.
    /// Returns false when no matching credential exists.
    pub async fn delete(&self, credential_id: &Uuid, user_id: &Uuid) -> Result<bool> {
        let result = Credential::delete_many()
            .filter(credential::Column::Id.eq(*credential_id))
            .filter(credential::Column::UserId.eq(*user_id))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
