//! Migration to create the credentials table.
//!
//! This migration creates the credentials table which stores user-owned
//! third-party secrets as encrypted blobs, with a denormalized expiry column
//! for listing and refresh scans.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Credentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Credentials::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Credentials::UserId).uuid().not_null())
                    .col(ColumnDef::new(Credentials::Provider).text().not_null())
                    .col(
                        ColumnDef::new(Credentials::CredentialType)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Credentials::Name).text().not_null())
                    .col(
                        ColumnDef::new(Credentials::SecretCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Credentials::Config).json_binary().null())
                    .col(
                        ColumnDef::new(Credentials::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Credentials::LastRefreshError)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Credentials::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Credentials::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Re-connecting a provider replaces the secret in place, keyed by name
        manager
            .create_index(
                Index::create()
                    .name("idx_credentials_user_name")
                    .table(Credentials::Table)
                    .col(Credentials::UserId)
                    .col(Credentials::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_credentials_user_id")
                    .table(Credentials::Table)
                    .col(Credentials::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_credentials_user_name").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_credentials_user_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Credentials::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Credentials {
    Table,
    Id,
    UserId,
    Provider,
    CredentialType,
    Name,
    SecretCiphertext,
    Config,
    ExpiresAt,
    LastRefreshError,
    CreatedAt,
    UpdatedAt,
}
