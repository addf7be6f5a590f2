//! # RestoreHistory Repository
//!
//! Append-only: there is deliberately no update or delete.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::BackupError;
use crate::models::RestoreStatus;
use crate::models::restore_history::{ActiveModel, Column, Entity, Model};

/// One restore attempt to be recorded.
#[derive(Debug, Clone)]
pub struct RestoreRecord {
    pub execution_id: Uuid,
    pub job_id: Uuid,
    pub target: String,
    pub status: RestoreStatus,
    pub options: JsonValue,
    pub warnings: Vec<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RestoreHistoryRepository {
    db: DatabaseConnection,
}

impl RestoreHistoryRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn append(&self, record: RestoreRecord) -> Result<Model, BackupError> {
        let model = ActiveModel {
            id: Set(Uuid::new_v4()),
            execution_id: Set(record.execution_id),
            job_id: Set(record.job_id),
            target: Set(record.target),
            status: Set(record.status.as_str().to_string()),
            options: Set(Some(record.options)),
            warnings: Set(Some(JsonValue::from(record.warnings))),
            error_message: Set(record.error_message),
            started_at: Set(record.started_at.fixed_offset()),
            ended_at: Set(record.ended_at.fixed_offset()),
            duration_ms: Set((record.ended_at - record.started_at).num_milliseconds()),
            created_at: Set(Utc::now().fixed_offset()),
        };

        let created = model
            .insert(&self.db)
            .await
            .map_err(|e| BackupError::database("recording restore history", e))?;

        tracing::info!(
            restore_id = %created.id,
            execution_id = %created.execution_id,
            status = %created.status,
            "Restore attempt recorded"
        );
        Ok(created)
    }

    /// Attempts for one execution, newest first.
    pub async fn list_for_execution(&self, execution_id: Uuid) -> Result<Vec<Model>, BackupError> {
        Entity::find()
            .filter(Column::ExecutionId.eq(execution_id))
            .order_by_desc(Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(|e| BackupError::database("listing restore history", e))
    }
}
