//! Migration to create the backup_executions table.
//!
//! Each row tracks one attempt of a backup job through its lifecycle
//! (pending, running, and the terminal or post-completion states).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BackupExecutions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BackupExecutions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BackupExecutions::JobId).uuid().not_null())
                    .col(
                        ColumnDef::new(BackupExecutions::Status)
                            .text()
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(
                        ColumnDef::new(BackupExecutions::TriggeredBy)
                            .text()
                            .not_null()
                            .default("MANUAL"),
                    )
                    .col(
                        ColumnDef::new(BackupExecutions::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(BackupExecutions::EndedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(BackupExecutions::DurationMs).big_integer().null())
                    .col(ColumnDef::new(BackupExecutions::FilePath).text().null())
                    .col(ColumnDef::new(BackupExecutions::SizeBytes).big_integer().null())
                    .col(
                        ColumnDef::new(BackupExecutions::CompressedSizeBytes)
                            .big_integer()
                            .null(),
                    )
                    .col(ColumnDef::new(BackupExecutions::FileCount).integer().null())
                    .col(ColumnDef::new(BackupExecutions::Checksum).text().null())
                    .col(
                        ColumnDef::new(BackupExecutions::Verified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(BackupExecutions::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(BackupExecutions::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BackupExecutions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BackupExecutions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_backup_executions_job_id")
                            .from(BackupExecutions::Table, BackupExecutions::JobId)
                            .to(BackupJobs::Table, BackupJobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_backup_executions_job_status")
                    .table(BackupExecutions::Table)
                    .col(BackupExecutions::JobId)
                    .col(BackupExecutions::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_backup_executions_created_at")
                    .table(BackupExecutions::Table)
                    .col(BackupExecutions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_backup_executions_created_at")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_backup_executions_job_status")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(BackupExecutions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BackupExecutions {
    Table,
    Id,
    JobId,
    Status,
    TriggeredBy,
    StartedAt,
    EndedAt,
    DurationMs,
    FilePath,
    SizeBytes,
    CompressedSizeBytes,
    FileCount,
    Checksum,
    Verified,
    ErrorMessage,
    RetryCount,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum BackupJobs {
    Table,
    Id,
}
