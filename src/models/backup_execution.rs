//! BackupExecution entity model
//!
//! One row per attempt of a backup job. Status strings follow
//! [`super::ExecutionStatus`]; writes go through
//! [`crate::repositories::ExecutionRepository`] so transitions stay monotonic.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "backup_executions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub job_id: Uuid,
    pub status: String,
    /// MANUAL or SCHEDULED
    pub triggered_by: String,
    pub started_at: Option<DateTimeWithTimeZone>,
    pub ended_at: Option<DateTimeWithTimeZone>,
    pub duration_ms: Option<i64>,
    pub file_path: Option<String>,
    pub size_bytes: Option<i64>,
    pub compressed_size_bytes: Option<i64>,
    pub file_count: Option<i32>,
    /// Lowercase hex SHA-256 of the artifact
    pub checksum: Option<String>,
    pub verified: bool,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::backup_job::Entity",
        from = "Column::JobId",
        to = "super::backup_job::Column::Id",
        on_delete = "Cascade"
    )]
    Job,
}

impl Related<super::backup_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Job.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parsed lifecycle status; unknown strings are treated as failed.
    pub fn status(&self) -> super::ExecutionStatus {
        self.status
            .parse()
            .unwrap_or(super::ExecutionStatus::Failed)
    }

    /// Reference time used for retention and windowed health queries.
    pub fn reference_time(&self) -> DateTimeWithTimeZone {
        self.started_at.unwrap_or(self.created_at)
    }
}
