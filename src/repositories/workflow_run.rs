//! Workflow run repository
//!
//! Exposes the two atomic conditional writes the run state machine depends
//! on: insert-if-absent admission keyed by the dedup triple, and
//! update-only-if-still-running termination keyed by the external run id.

use anyhow::Result;
use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    sea_query::{Expr, OnConflict},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::workflow_run::{self, Entity as WorkflowRun};

const STATUS_RUNNING: &str = "RUNNING";

/// Repository for workflow run rows
#[derive(Clone)]
pub struct WorkflowRunRepository {
    pub db: Arc<DatabaseConnection>,
}

impl WorkflowRunRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert a RUNNING row if no row exists for the dedup triple.
    /// Returns the row when inserted, `None` when the admission was a
    /// duplicate (conflict on the unique index).
    pub async fn admit(
        &self,
        workflow_id: &Uuid,
        user_id: &Uuid,
        idempotency_key: &str,
        external_run_id: &str,
        input: Option<serde_json::Value>,
    ) -> Result<Option<workflow_run::Model>> {
        let id = Uuid::new_v4();
        let active = workflow_run::ActiveModel {
            id: Set(id),
            workflow_id: Set(*workflow_id),
            user_id: Set(*user_id),
            external_run_id: Set(external_run_id.to_string()),
            idempotency_key: Set(idempotency_key.to_string()),
            status: Set(STATUS_RUNNING.to_string()),
            input: Set(input),
            error: Set(None),
            started_at: Set(Utc::now().into()),
            completed_at: Set(None),
        };

        let inserted = WorkflowRun::insert(active)
            .on_conflict(
                OnConflict::columns([
                    workflow_run::Column::WorkflowId,
                    workflow_run::Column::UserId,
                    workflow_run::Column::IdempotencyKey,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        if inserted == 0 {
            return Ok(None);
        }

        Ok(WorkflowRun::find_by_id(id).one(&*self.db).await?)
    }

    /// Conditionally write a terminal status: only rows still RUNNING are
    /// touched, so the first terminal write wins. Returns the number of rows
    /// updated (0 or 1).
    pub async fn transition(
        &self,
        external_run_id: &str,
        to_status: &str,
        error: Option<&str>,
    ) -> Result<u64> {
        let completed_at: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let result = WorkflowRun::update_many()
            .col_expr(workflow_run::Column::Status, Expr::value(to_status))
            .col_expr(workflow_run::Column::CompletedAt, Expr::value(completed_at))
            .col_expr(
                workflow_run::Column::Error,
                Expr::value(error.map(str::to_string)),
            )
            .filter(workflow_run::Column::ExternalRunId.eq(external_run_id))
            .filter(workflow_run::Column::Status.eq(STATUS_RUNNING))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// RUNNING rows for a `(workflow, user)` pair, oldest first
    pub async fn find_running(
        &self,
        workflow_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Vec<workflow_run::Model>> {
        Ok(WorkflowRun::find()
            .filter(workflow_run::Column::WorkflowId.eq(*workflow_id))
            .filter(workflow_run::Column::UserId.eq(*user_id))
            .filter(workflow_run::Column::Status.eq(STATUS_RUNNING))
            .order_by_asc(workflow_run::Column::StartedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn find_by_external_run_id(
        &self,
        external_run_id: &str,
    ) -> Result<Option<workflow_run::Model>> {
        Ok(WorkflowRun::find()
            .filter(workflow_run::Column::ExternalRunId.eq(external_run_id))
            .one(&*self.db)
            .await?)
    }

    /// Run history for the dashboard, newest first
    pub async fn list_for_workflow(
        &self,
        workflow_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Vec<workflow_run::Model>> {
        Ok(WorkflowRun::find()
            .filter(workflow_run::Column::WorkflowId.eq(*workflow_id))
            .filter(workflow_run::Column::UserId.eq(*user_id))
            .order_by_desc(workflow_run::Column::StartedAt)
            .all(&*self.db)
            .await?)
    }
}
