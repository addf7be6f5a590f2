//! Migration to create the restore_history table.
//!
//! Rows are append-only: one per restore attempt against a backup execution.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RestoreHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RestoreHistory::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RestoreHistory::ExecutionId).uuid().not_null())
                    .col(ColumnDef::new(RestoreHistory::JobId).uuid().not_null())
                    .col(ColumnDef::new(RestoreHistory::Target).text().not_null())
                    .col(ColumnDef::new(RestoreHistory::Status).text().not_null())
                    .col(ColumnDef::new(RestoreHistory::Options).json_binary().null())
                    .col(ColumnDef::new(RestoreHistory::Warnings).json_binary().null())
                    .col(ColumnDef::new(RestoreHistory::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(RestoreHistory::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RestoreHistory::EndedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RestoreHistory::DurationMs)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RestoreHistory::CreatedAt)
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
                    .name("idx_restore_history_execution_id")
                    .table(RestoreHistory::Table)
                    .col(RestoreHistory::ExecutionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_restore_history_execution_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(RestoreHistory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RestoreHistory {
    Table,
    Id,
    ExecutionId,
    JobId,
    Target,
    Status,
    Options,
    Warnings,
    ErrorMessage,
    StartedAt,
    EndedAt,
    DurationMs,
    CreatedAt,
}
