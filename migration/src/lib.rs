//! Database migrations for the Duramation core service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_01_000001_create_credentials;
mod m2025_06_01_000002_create_workflow_credentials;
mod m2025_06_01_000003_create_workflow_runs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_01_000001_create_credentials::Migration),
            Box::new(m2025_06_01_000002_create_workflow_credentials::Migration),
            Box::new(m2025_06_01_000003_create_workflow_runs::Migration),
        ]
    }
}
