//! Migration to create the workflow_credentials join table.
//!
//! Associates credentials to the workflows that consume them. The pair is
//! unique; rows disappear when either side is deleted.

use sea_orm_migration::prelude::*;

use crate::m2025_06_01_000001_create_credentials::Credentials;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WorkflowCredentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkflowCredentials::WorkflowId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkflowCredentials::CredentialId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkflowCredentials::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(WorkflowCredentials::WorkflowId)
                            .col(WorkflowCredentials::CredentialId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_workflow_credentials_credential_id")
                            .from(
                                WorkflowCredentials::Table,
                                WorkflowCredentials::CredentialId,
                            )
                            .to(Credentials::Table, Credentials::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_workflow_credentials_workflow_id")
                    .table(WorkflowCredentials::Table)
                    .col(WorkflowCredentials::WorkflowId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_workflow_credentials_workflow_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(WorkflowCredentials::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum WorkflowCredentials {
    Table,
    WorkflowId,
    CredentialId,
    CreatedAt,
}
