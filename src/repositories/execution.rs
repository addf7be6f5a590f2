//! # BackupExecution Repository
//!
//! Every status change is a compare-and-set `UPDATE ... WHERE status = <from>`
//! so concurrent writers can never move an execution backwards.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::error::BackupError;
use crate::models::backup_execution::{ActiveModel, Column, Entity, Model};
use crate::models::{ExecutionStatus, ExecutionTrigger};
use crate::strategies::StrategyOutcome;

pub const INTERRUPTED_MESSAGE: &str = "interrupted by restart";

/// Repository for backup execution database operations
#[derive(Debug, Clone)]
pub struct ExecutionRepository {
    db: DatabaseConnection,
}

impl ExecutionRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create_pending(
        &self,
        job_id: Uuid,
        trigger: ExecutionTrigger,
    ) -> Result<Model, BackupError> {
        let now = Utc::now().fixed_offset();
        let model = ActiveModel {
            id: Set(Uuid::new_v4()),
            job_id: Set(job_id),
            status: Set(ExecutionStatus::Pending.as_str().to_string()),
            triggered_by: Set(trigger.as_str().to_string()),
            started_at: Set(None),
            ended_at: Set(None),
            duration_ms: Set(None),
            file_path: Set(None),
            size_bytes: Set(None),
            compressed_size_bytes: Set(None),
            file_count: Set(None),
            checksum: Set(None),
            verified: Set(false),
            error_message: Set(None),
            retry_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        model
            .insert(&self.db)
            .await
            .map_err(|e| BackupError::database("creating backup execution", e))
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Model>, BackupError> {
        Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| BackupError::database("loading backup execution", e))
    }

    pub async fn get(&self, id: Uuid) -> Result<Model, BackupError> {
        self.find(id)
            .await?
            .ok_or_else(|| BackupError::execution_not_found(id))
    }

    /// Executions newest first, optionally limited to one job.
    pub async fn list(&self, job_id: Option<Uuid>) -> Result<Vec<Model>, BackupError> {
        let mut query = Entity::find().order_by_desc(Column::CreatedAt);
        if let Some(job_id) = job_id {
            query = query.filter(Column::JobId.eq(job_id));
        }
        query
            .all(&self.db)
            .await
            .map_err(|e| BackupError::database("listing backup executions", e))
    }

    /// Apply `patch` and move `id` from `from` to `to`, failing if the row is
    /// no longer in `from`.
    pub async fn transition(
        &self,
        id: Uuid,
        from: ExecutionStatus,
        to: ExecutionStatus,
        mut patch: ActiveModel,
    ) -> Result<Model, BackupError> {
        if !from.can_transition_to(to) {
            return Err(BackupError::invalid(format!(
                "execution {id} cannot move from {from} to {to}"
            )));
        }

        patch.status = Set(to.as_str().to_string());
        patch.updated_at = Set(Utc::now().fixed_offset());

        let result = Entity::update_many()
            .set(patch)
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(from.as_str()))
            .exec(&self.db)
            .await
            .map_err(|e| BackupError::database("updating execution status", e))?;

        if result.rows_affected == 0 {
            let current = self.get(id).await?;
            return Err(BackupError::invalid(format!(
                "execution {id} is {}, expected {from}",
                current.status
            )));
        }

        tracing::debug!(execution_id = %id, %from, %to, "Execution status changed");
        self.get(id).await
    }

    pub async fn mark_running(&self, id: Uuid) -> Result<Model, BackupError> {
        let patch = ActiveModel {
            started_at: Set(Some(Utc::now().fixed_offset())),
            ..Default::default()
        };
        self.transition(id, ExecutionStatus::Pending, ExecutionStatus::Running, patch)
            .await
    }

    /// Record a strategy outcome; this is the only write of path and checksum.
    pub async fn finish(&self, id: Uuid, outcome: &StrategyOutcome) -> Result<Model, BackupError> {
        let to = if outcome.is_success() {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };
        let patch = ActiveModel {
            ended_at: Set(Some(outcome.ended_at.fixed_offset())),
            duration_ms: Set(Some(outcome.duration_ms)),
            file_path: Set(outcome
                .file_path
                .as_ref()
                .map(|p| p.display().to_string())),
            size_bytes: Set(Some(outcome.size_bytes)),
            compressed_size_bytes: Set(outcome.compressed_size_bytes),
            file_count: Set(Some(outcome.file_count)),
            checksum: Set(outcome.checksum.clone()),
            verified: Set(outcome.verified),
            error_message: Set(outcome.error_message.clone()),
            ..Default::default()
        };
        self.transition(id, ExecutionStatus::Running, to, patch)
            .await
    }

    pub async fn mark_verified(
        &self,
        id: Uuid,
        from: ExecutionStatus,
    ) -> Result<Model, BackupError> {
        let patch = ActiveModel {
            verified: Set(true),
            ..Default::default()
        };
        self.transition(id, from, ExecutionStatus::Verified, patch)
            .await
    }

    pub async fn mark_corrupted(
        &self,
        id: Uuid,
        from: ExecutionStatus,
        message: String,
    ) -> Result<Model, BackupError> {
        let patch = ActiveModel {
            verified: Set(false),
            error_message: Set(Some(message)),
            ..Default::default()
        };
        self.transition(id, from, ExecutionStatus::Corrupted, patch)
            .await
    }

    pub async fn cancel(&self, id: Uuid) -> Result<Model, BackupError> {
        let patch = ActiveModel {
            ended_at: Set(Some(Utc::now().fixed_offset())),
            error_message: Set(Some("cancelled before start".to_string())),
            ..Default::default()
        };
        self.transition(id, ExecutionStatus::Pending, ExecutionStatus::Cancelled, patch)
            .await
    }

    /// Close out executions a previous process left in progress: RUNNING rows
    /// fail and PENDING rows are cancelled. Returns the number of rows
    /// touched.
    pub async fn close_interrupted(&self, now: DateTime<Utc>) -> Result<u64, BackupError> {
        let mut touched = 0;
        for (from, to) in [
            (ExecutionStatus::Running, ExecutionStatus::Failed),
            (ExecutionStatus::Pending, ExecutionStatus::Cancelled),
        ] {
            let patch = ActiveModel {
                status: Set(to.as_str().to_string()),
                ended_at: Set(Some(now.fixed_offset())),
                error_message: Set(Some(INTERRUPTED_MESSAGE.to_string())),
                updated_at: Set(now.fixed_offset()),
                ..Default::default()
            };
            let result = Entity::update_many()
                .set(patch)
                .filter(Column::Status.eq(from.as_str()))
                .exec(&self.db)
                .await
                .map_err(|e| BackupError::database("closing interrupted executions", e))?;
            touched += result.rows_affected;
        }
        Ok(touched)
    }

    pub async fn delete(&self, id: Uuid) -> Result<u64, BackupError> {
        let result = Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(|e| BackupError::database("deleting backup execution", e))?;
        Ok(result.rows_affected)
    }
}
