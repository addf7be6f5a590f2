//! RestoreHistory entity model
//!
//! Append-only log of restore attempts. Rows are inserted once and never
//! updated.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "restore_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub execution_id: Uuid,
    pub job_id: Uuid,
    /// Target descriptor with credentials removed
    pub target: String,
    pub status: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub options: Option<JsonValue>,
    #[sea_orm(column_type = "JsonBinary")]
    pub warnings: Option<JsonValue>,
    pub error_message: Option<String>,
    pub started_at: DateTimeWithTimeZone,
    pub ended_at: DateTimeWithTimeZone,
    pub duration_ms: i64,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
