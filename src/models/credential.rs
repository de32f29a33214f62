//! Credential entity model
//!
//! This module contains the SeaORM entity model for the credentials table,
//! which stores user-owned third-party secrets as encrypted blobs.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Credential entity representing a user's connection to a provider
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "credentials")]
pub struct Model {
    /// Unique identifier for the credential (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Provider identifier (e.g. "GOOGLE", "SLACK")
    pub provider: String,

    /// Credential class ("OAUTH" | "API_KEY")
    pub credential_type: String,

    /// Display name, unique per user
    pub name: String,

    /// Encrypted secret payload (versioned AES-256-GCM blob)
    pub secret_ciphertext: Vec<u8>,

    /// Non-secret configuration (e.g. granted OAuth scopes)
    #[sea_orm(column_type = "JsonBinary")]
    pub config: Option<JsonValue>,

    /// Denormalized access-token expiry for listing and refresh scans
    pub expires_at: Option<DateTimeWithTimeZone>,

    /// Most recent refresh failure, cleared on success
    pub last_refresh_error: Option<String>,

    /// Timestamp when the credential was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the credential was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::workflow_credential::Entity")]
    WorkflowCredential,
}

impl Related<super::workflow_credential::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorkflowCredential.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
