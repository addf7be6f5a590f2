//! # BackupJob Repository
//!
//! SeaORM operations for the backup_jobs table: creation, lookup, the
//! active/schedule switches and the cumulative outcome counters.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::BackupError;
use crate::models::backup_job::{ActiveModel, Column, Entity, Model};
use crate::models::{BackupExecution, RetentionPolicy, backup_execution, retention_policy};

/// Validated input for a new job.
#[derive(Debug, Clone)]
pub struct NewBackupJob {
    pub name: String,
    pub kind: String,
    pub data_source: String,
    pub schedule: Option<String>,
    pub timezone: Option<String>,
    pub retention_days: i32,
    pub compression: bool,
    pub encryption: bool,
    pub storage_location: String,
    pub options: Option<JsonValue>,
    pub active: bool,
}

/// Repository for backup job database operations
#[derive(Debug, Clone)]
pub struct JobRepository {
    db: DatabaseConnection,
}

impl JobRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        job: NewBackupJob,
        next_backup: Option<DateTime<Utc>>,
    ) -> Result<Model, BackupError> {
        let now = Utc::now().fixed_offset();
        let model = ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(job.name),
            kind: Set(job.kind),
            data_source: Set(job.data_source),
            schedule: Set(job.schedule),
            timezone: Set(job.timezone),
            retention_days: Set(job.retention_days),
            compression: Set(job.compression),
            encryption: Set(job.encryption),
            storage_location: Set(job.storage_location),
            options: Set(job.options),
            active: Set(job.active),
            success_count: Set(0),
            failure_count: Set(0),
            total_bytes: Set(0),
            last_backup: Set(None),
            next_backup: Set(next_backup.map(|t| t.fixed_offset())),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model
            .insert(&self.db)
            .await
            .map_err(|e| BackupError::database("creating backup job", e))?;

        tracing::info!(job_id = %created.id, job_name = %created.name, "Backup job created");
        Ok(created)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Model>, BackupError> {
        Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| BackupError::database("loading backup job", e))
    }

    /// Like [`find`](Self::find) but a missing row is `NotFound`.
    pub async fn get(&self, id: Uuid) -> Result<Model, BackupError> {
        self.find(id)
            .await?
            .ok_or_else(|| BackupError::job_not_found(id))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Model>, BackupError> {
        Entity::find()
            .filter(Column::Name.eq(name))
            .one(&self.db)
            .await
            .map_err(|e| BackupError::database("loading backup job by name", e))
    }

    pub async fn list(&self) -> Result<Vec<Model>, BackupError> {
        Entity::find()
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Name)
            .all(&self.db)
            .await
            .map_err(|e| BackupError::database("listing backup jobs", e))
    }

    /// Active jobs that carry a schedule.
    pub async fn list_schedulable(&self) -> Result<Vec<Model>, BackupError> {
        let jobs = Entity::find()
            .filter(Column::Active.eq(true))
            .filter(Column::Schedule.is_not_null())
            .order_by_asc(Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(|e| BackupError::database("listing scheduled jobs", e))?;
        Ok(jobs.into_iter().filter(Model::is_schedulable).collect())
    }

    pub async fn set_active(
        &self,
        job: Model,
        active: bool,
        next_backup: Option<DateTime<Utc>>,
    ) -> Result<Model, BackupError> {
        let mut model: ActiveModel = job.into();
        model.active = Set(active);
        model.next_backup = Set(next_backup.map(|t| t.fixed_offset()));
        model.updated_at = Set(Utc::now().fixed_offset());
        model
            .update(&self.db)
            .await
            .map_err(|e| BackupError::database("toggling backup job", e))
    }

    pub async fn set_schedule(
        &self,
        job: Model,
        schedule: Option<String>,
        timezone: Option<String>,
        next_backup: Option<DateTime<Utc>>,
    ) -> Result<Model, BackupError> {
        let mut model: ActiveModel = job.into();
        model.schedule = Set(schedule);
        model.timezone = Set(timezone);
        model.next_backup = Set(next_backup.map(|t| t.fixed_offset()));
        model.updated_at = Set(Utc::now().fixed_offset());
        model
            .update(&self.db)
            .await
            .map_err(|e| BackupError::database("rescheduling backup job", e))
    }

    pub async fn set_next_backup(
        &self,
        job: Model,
        next_backup: Option<DateTime<Utc>>,
    ) -> Result<Model, BackupError> {
        let mut model: ActiveModel = job.into();
        model.next_backup = Set(next_backup.map(|t| t.fixed_offset()));
        model
            .update(&self.db)
            .await
            .map_err(|e| BackupError::database("updating next backup time", e))
    }

    /// Fold one finished execution into the job's counters.
    ///
    /// Callers hold the job's in-flight claim, so the read-modify-write
    /// cannot race another outcome for the same job.
    pub async fn record_outcome(
        &self,
        job_id: Uuid,
        success: bool,
        bytes: i64,
        finished_at: DateTime<Utc>,
        next_backup: Option<DateTime<Utc>>,
    ) -> Result<Model, BackupError> {
        let job = self.get(job_id).await?;
        let mut model: ActiveModel = job.clone().into();
        if success {
            model.success_count = Set(job.success_count + 1);
            model.total_bytes = Set(job.total_bytes + bytes.max(0));
            model.last_backup = Set(Some(finished_at.fixed_offset()));
        } else {
            model.failure_count = Set(job.failure_count + 1);
        }
        model.next_backup = Set(next_backup.map(|t| t.fixed_offset()));
        model.updated_at = Set(Utc::now().fixed_offset());
        model
            .update(&self.db)
            .await
            .map_err(|e| BackupError::database("recording backup outcome", e))
    }

    /// Remove the job with its executions and job-scoped retention policy.
    ///
    /// Children are deleted explicitly so the cascade does not depend on the
    /// backend enforcing foreign keys.
    pub async fn delete(&self, id: Uuid) -> Result<u64, BackupError> {
        BackupExecution::delete_many()
            .filter(backup_execution::Column::JobId.eq(id))
            .exec(&self.db)
            .await
            .map_err(|e| BackupError::database("deleting job executions", e))?;
        RetentionPolicy::delete_many()
            .filter(retention_policy::Column::JobId.eq(id))
            .exec(&self.db)
            .await
            .map_err(|e| BackupError::database("deleting job retention policy", e))?;

        let result = Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(|e| BackupError::database("deleting backup job", e))?;
        Ok(result.rows_affected)
    }
}
