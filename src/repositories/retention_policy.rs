//! # RetentionPolicy Repository
//!
//! At most one row per scope: a job id, or NULL for the global policy.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use crate::error::BackupError;
use crate::models::retention_policy::{ActiveModel, Column, Entity, Model};
use crate::retention::RetentionRules;

#[derive(Debug, Clone)]
pub struct RetentionPolicyRepository {
    db: DatabaseConnection,
}

fn to_column(value: Option<u32>) -> Option<i32> {
    value.map(|v| i32::try_from(v).unwrap_or(i32::MAX))
}

impl RetentionPolicyRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_for_job(&self, job_id: Uuid) -> Result<Option<Model>, BackupError> {
        Entity::find()
            .filter(Column::JobId.eq(job_id))
            .one(&self.db)
            .await
            .map_err(|e| BackupError::database("loading job retention policy", e))
    }

    pub async fn find_global(&self) -> Result<Option<Model>, BackupError> {
        Entity::find()
            .filter(Column::JobId.is_null())
            .one(&self.db)
            .await
            .map_err(|e| BackupError::database("loading global retention policy", e))
    }

    /// Insert or replace the policy for `job_id` (global when `None`).
    pub async fn upsert(
        &self,
        job_id: Option<Uuid>,
        rules: &RetentionRules,
    ) -> Result<Model, BackupError> {
        let existing = match job_id {
            Some(id) => self.find_for_job(id).await?,
            None => self.find_global().await?,
        };
        let now = Utc::now().fixed_offset();

        let mut model: ActiveModel = match &existing {
            Some(row) => row.clone().into(),
            None => ActiveModel {
                id: Set(Uuid::new_v4()),
                job_id: Set(job_id),
                created_at: Set(now),
                ..Default::default()
            },
        };
        model.retention_days = Set(to_column(rules.retention_days));
        model.keep_daily = Set(to_column(rules.keep_daily));
        model.keep_weekly = Set(to_column(rules.keep_weekly));
        model.keep_monthly = Set(to_column(rules.keep_monthly));
        model.keep_yearly = Set(to_column(rules.keep_yearly));
        model.updated_at = Set(now);

        let saved = if existing.is_some() {
            model.update(&self.db).await
        } else {
            model.insert(&self.db).await
        }
        .map_err(|e| BackupError::database("saving retention policy", e))?;

        tracing::info!(policy_id = %saved.id, job_id = ?saved.job_id, "Retention policy saved");
        Ok(saved)
    }
}
