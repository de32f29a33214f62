//! Workflow run entity model
//!
//! One row per admitted run. The `(workflow_id, user_id, idempotency_key)`
//! unique index enforces admission dedup; `external_run_id` is the handle
//! the durable execution engine uses for terminal transitions.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "workflow_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub workflow_id: Uuid,

    pub user_id: Uuid,

    /// Run id assigned by the external execution engine
    pub external_run_id: String,

    /// Caller-supplied dedup token
    pub idempotency_key: String,

    /// "RUNNING" | "COMPLETED" | "FAILED" | "CANCELLED"
    pub status: String,

    /// Trigger input captured at admission
    #[sea_orm(column_type = "JsonBinary")]
    pub input: Option<JsonValue>,

    /// Failure description for FAILED runs
    pub error: Option<String>,

    pub started_at: DateTimeWithTimeZone,

    /// Set by the first terminal transition
    pub completed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
