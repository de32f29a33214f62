//! Migration to create the workflow_runs table.
//!
//! The unique index on (workflow_id, user_id, idempotency_key) enforces the
//! run-admission dedup invariant; external_run_id is the handle the durable
//! execution engine uses for terminal transitions.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WorkflowRuns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkflowRuns::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WorkflowRuns::WorkflowId).uuid().not_null())
                    .col(ColumnDef::new(WorkflowRuns::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(WorkflowRuns::ExternalRunId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkflowRuns::IdempotencyKey)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkflowRuns::Status)
                            .text()
                            .not_null()
                            .default("RUNNING"),
                    )
                    .col(ColumnDef::new(WorkflowRuns::Input).json_binary().null())
                    .col(ColumnDef::new(WorkflowRuns::Error).text().null())
                    .col(
                        ColumnDef::new(WorkflowRuns::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WorkflowRuns::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_workflow_runs_dedup")
                    .table(WorkflowRuns::Table)
                    .col(WorkflowRuns::WorkflowId)
                    .col(WorkflowRuns::UserId)
                    .col(WorkflowRuns::IdempotencyKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_workflow_runs_external_run_id")
                    .table(WorkflowRuns::Table)
                    .col(WorkflowRuns::ExternalRunId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Cancellation matches on (workflow_id, user_id) over RUNNING rows
        manager
            .create_index(
                Index::create()
                    .name("idx_workflow_runs_workflow_user")
                    .table(WorkflowRuns::Table)
                    .col(WorkflowRuns::WorkflowId)
                    .col(WorkflowRuns::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_workflow_runs_dedup").to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_workflow_runs_external_run_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_workflow_runs_workflow_user")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(WorkflowRuns::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum WorkflowRuns {
    Table,
    Id,
    WorkflowId,
    UserId,
    ExternalRunId,
    IdempotencyKey,
    Status,
    Input,
    Error,
    StartedAt,
    CompletedAt,
}
