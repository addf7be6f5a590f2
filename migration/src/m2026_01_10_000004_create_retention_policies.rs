//! Migration to create the retention_policies table.
//!
//! A row with a NULL job_id is the global policy; otherwise it applies to a
//! single backup job and is removed together with it.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RetentionPolicies::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RetentionPolicies::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RetentionPolicies::JobId).uuid().null())
                    .col(ColumnDef::new(RetentionPolicies::RetentionDays).integer().null())
                    .col(ColumnDef::new(RetentionPolicies::KeepDaily).integer().null())
                    .col(ColumnDef::new(RetentionPolicies::KeepWeekly).integer().null())
                    .col(ColumnDef::new(RetentionPolicies::KeepMonthly).integer().null())
                    .col(ColumnDef::new(RetentionPolicies::KeepYearly).integer().null())
                    .col(
                        ColumnDef::new(RetentionPolicies::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(RetentionPolicies::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_retention_policies_job_id")
                            .from(RetentionPolicies::Table, RetentionPolicies::JobId)
                            .to(BackupJobs::Table, BackupJobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_retention_policies_job_id")
                    .table(RetentionPolicies::Table)
                    .col(RetentionPolicies::JobId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_retention_policies_job_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(RetentionPolicies::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RetentionPolicies {
    Table,
    Id,
    JobId,
    RetentionDays,
    KeepDaily,
    KeepWeekly,
    KeepMonthly,
    KeepYearly,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum BackupJobs {
    Table,
    Id,
}
