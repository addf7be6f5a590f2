//! Database migrations for the backup orchestrator.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_01_10_000001_create_backup_jobs;
mod m2026_01_10_000002_create_backup_executions;
mod m2026_01_10_000003_create_restore_history;
mod m2026_01_10_000004_create_retention_policies;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_10_000001_create_backup_jobs::Migration),
            Box::new(m2026_01_10_000002_create_backup_executions::Migration),
            Box::new(m2026_01_10_000003_create_restore_history::Migration),
            Box::new(m2026_01_10_000004_create_retention_policies::Migration),
        ]
    }
}
