//! BackupJob entity model
//!
//! SeaORM entity for the backup_jobs table: the durable definition of a
//! backup, its optional schedule, and its cumulative run statistics.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "backup_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human readable, unique job name
    pub name: String,

    /// Backup kind (FULL, INCREMENTAL, ...)
    pub kind: String,

    /// Data-source descriptor, e.g. `database:postgresql://db/app`
    pub data_source: String,

    /// Cron expression (5 or 6 fields)
    pub schedule: Option<String>,

    /// `UTC` or a fixed offset such as `+02:00`
    pub timezone: Option<String>,

    pub retention_days: i32,
    pub compression: bool,
    pub encryption: bool,

    /// Storage location relative to the configured storage root
    pub storage_location: String,

    /// Serialized [`crate::strategies::BackupOptions`]
    #[sea_orm(column_type = "JsonBinary")]
    pub options: Option<JsonValue>,

    pub active: bool,
    pub success_count: i64,
    pub failure_count: i64,
    pub total_bytes: i64,
    pub last_backup: Option<DateTimeWithTimeZone>,
    pub next_backup: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::backup_execution::Entity")]
    Executions,
}

impl Related<super::backup_execution::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Executions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the job should hold a live scheduler timer.
    pub fn is_schedulable(&self) -> bool {
        self.active
            && self
                .schedule
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty())
    }
}
