//! Migration to create the backup_jobs table.
//!
//! A backup job is the durable definition of what gets backed up, where the
//! artifacts land, and (optionally) the cron schedule that triggers it.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BackupJobs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BackupJobs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(BackupJobs::Name).text().not_null())
                    .col(ColumnDef::new(BackupJobs::Kind).text().not_null())
                    .col(ColumnDef::new(BackupJobs::DataSource).text().not_null())
                    .col(ColumnDef::new(BackupJobs::Schedule).text().null())
                    .col(ColumnDef::new(BackupJobs::Timezone).text().null())
                    .col(
                        ColumnDef::new(BackupJobs::RetentionDays)
                            .integer()
                            .not_null()
                            .default(30),
                    )
                    .col(
                        ColumnDef::new(BackupJobs::Compression)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(BackupJobs::Encryption)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(BackupJobs::StorageLocation).text().not_null())
                    .col(ColumnDef::new(BackupJobs::Options).json_binary().null())
                    .col(
                        ColumnDef::new(BackupJobs::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(BackupJobs::SuccessCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BackupJobs::FailureCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BackupJobs::TotalBytes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BackupJobs::LastBackup)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(BackupJobs::NextBackup)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(BackupJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BackupJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_backup_jobs_name_unique")
                    .table(BackupJobs::Table)
                    .col(BackupJobs::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Startup rebuild of the scheduler scans active jobs
        manager
            .create_index(
                Index::create()
                    .name("idx_backup_jobs_active")
                    .table(BackupJobs::Table)
                    .col(BackupJobs::Active)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_backup_jobs_active").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_backup_jobs_name_unique").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BackupJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BackupJobs {
    Table,
    Id,
    Name,
    Kind,
    DataSource,
    Schedule,
    Timezone,
    RetentionDays,
    Compression,
    Encryption,
    StorageLocation,
    Options,
    Active,
    SuccessCount,
    FailureCount,
    TotalBytes,
    LastBackup,
    NextBackup,
    CreatedAt,
    UpdatedAt,
}
