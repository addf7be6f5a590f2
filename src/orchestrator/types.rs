//! Requests accepted by the orchestrator and the views it returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::redact_url_credentials;
use crate::models::{
    BackupKind, RestoreStatus, backup_execution, backup_job, restore_history, retention_policy,
};
use crate::strategies::BackupOptions;

fn default_true() -> bool {
    true
}

/// Input for creating a backup job.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateJobRequest {
    pub name: String,
    pub kind: BackupKind,
    /// e.g. `database:postgresql://backup@db:5432/app`
    pub data_source: String,
    /// 5- or 6-field cron expression
    pub schedule: Option<String>,
    /// `UTC` or a fixed offset such as `+02:00`
    pub timezone: Option<String>,
    /// Days to keep executions; unset inherits the global policy
    pub retention_days: Option<u32>,
    #[serde(default = "default_true")]
    pub compression: bool,
    #[serde(default)]
    pub encryption: bool,
    /// Directory below the storage root
    pub storage_location: String,
    pub options: Option<BackupOptions>,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Replace a job's schedule; a missing or empty schedule removes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RescheduleRequest {
    pub schedule: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RestoreRequest {
    /// Defaults to the job's own data source
    pub target_database: Option<String>,
    #[serde(default)]
    pub overwrite_existing: bool,
    #[serde(default)]
    pub skip_errors: bool,
    /// Defaults to true
    pub verify_integrity: Option<bool>,
    #[serde(default)]
    pub dry_run: bool,
    pub parallel_threads: Option<u16>,
}

impl RestoreRequest {
    pub fn verify_integrity(&self) -> bool {
        self.verify_integrity.unwrap_or(true)
    }
}

/// Result of a restore attempt that was recorded in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RestoreOutcome {
    pub restore_id: Uuid,
    pub execution_id: Uuid,
    pub job_id: Uuid,
    pub status: RestoreStatus,
    /// Target with credentials removed
    pub target: String,
    pub integrity_verified: bool,
    pub duration_ms: i64,
    pub warnings: Vec<String>,
}

/// What a job deletion removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobDeletion {
    pub job_id: Uuid,
    pub deleted_executions: u64,
    pub removed_files: u64,
    /// Artifacts that could not be removed
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobView {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    /// Descriptor with credentials removed
    pub data_source: String,
    pub schedule: Option<String>,
    pub timezone: Option<String>,
    pub retention_days: i32,
    pub compression: bool,
    pub encryption: bool,
    pub storage_location: String,
    pub options: Option<JsonValue>,
    pub active: bool,
    pub success_count: i64,
    pub failure_count: i64,
    pub total_bytes: i64,
    pub last_backup: Option<DateTime<Utc>>,
    pub next_backup: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<backup_job::Model> for JobView {
    fn from(job: backup_job::Model) -> Self {
        Self {
            id: job.id,
            data_source: redact_url_credentials(&job.data_source),
            name: job.name,
            kind: job.kind,
            schedule: job.schedule,
            timezone: job.timezone,
            retention_days: job.retention_days,
            compression: job.compression,
            encryption: job.encryption,
            storage_location: job.storage_location,
            options: job.options,
            active: job.active,
            success_count: job.success_count,
            failure_count: job.failure_count,
            total_bytes: job.total_bytes,
            last_backup: job.last_backup.map(|t| t.with_timezone(&Utc)),
            next_backup: job.next_backup.map(|t| t.with_timezone(&Utc)),
            created_at: job.created_at.with_timezone(&Utc),
            updated_at: job.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExecutionView {
    pub id: Uuid,
    pub job_id: Uuid,
    pub status: String,
    pub triggered_by: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub file_path: Option<String>,
    pub size_bytes: Option<i64>,
    pub compressed_size_bytes: Option<i64>,
    pub file_count: Option<i32>,
    pub checksum: Option<String>,
    pub verified: bool,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<backup_execution::Model> for ExecutionView {
    fn from(execution: backup_execution::Model) -> Self {
        Self {
            id: execution.id,
            job_id: execution.job_id,
            status: execution.status,
            triggered_by: execution.triggered_by,
            started_at: execution.started_at.map(|t| t.with_timezone(&Utc)),
            ended_at: execution.ended_at.map(|t| t.with_timezone(&Utc)),
            duration_ms: execution.duration_ms,
            file_path: execution.file_path,
            size_bytes: execution.size_bytes,
            compressed_size_bytes: execution.compressed_size_bytes,
            file_count: execution.file_count,
            checksum: execution.checksum,
            verified: execution.verified,
            error_message: execution.error_message,
            retry_count: execution.retry_count,
            created_at: execution.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RestoreRecordView {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub job_id: Uuid,
    pub target: String,
    pub status: String,
    pub options: Option<JsonValue>,
    pub warnings: Vec<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl From<restore_history::Model> for RestoreRecordView {
    fn from(record: restore_history::Model) -> Self {
        let warnings = record
            .warnings
            .and_then(|w| serde_json::from_value(w).ok())
            .unwrap_or_default();
        Self {
            id: record.id,
            execution_id: record.execution_id,
            job_id: record.job_id,
            target: record.target,
            status: record.status,
            options: record.options,
            warnings,
            error_message: record.error_message,
            started_at: record.started_at.with_timezone(&Utc),
            ended_at: record.ended_at.with_timezone(&Utc),
            duration_ms: record.duration_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RetentionPolicyView {
    pub id: Uuid,
    /// Absent for the global policy
    pub job_id: Option<Uuid>,
    pub retention_days: Option<i32>,
    pub keep_daily: Option<i32>,
    pub keep_weekly: Option<i32>,
    pub keep_monthly: Option<i32>,
    pub keep_yearly: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl From<retention_policy::Model> for RetentionPolicyView {
    fn from(policy: retention_policy::Model) -> Self {
        Self {
            id: policy.id,
            job_id: policy.job_id,
            retention_days: policy.retention_days,
            keep_daily: policy.keep_daily,
            keep_weekly: policy.keep_weekly,
            keep_monthly: policy.keep_monthly,
            keep_yearly: policy.keep_yearly,
            updated_at: policy.updated_at.with_timezone(&Utc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_defaults() {
        let request: CreateJobRequest = serde_json::from_value(serde_json::json!({
            "name": "nightly-pg",
            "kind": "FULL",
            "data_source": "database:postgresql://db/app",
            "schedule": "0 2 * * *",
            "storage_location": "primary"
        }))
        .unwrap();

        assert!(request.active);
        assert!(request.compression);
        assert!(!request.encryption);
        assert_eq!(request.kind, BackupKind::Full);
        assert!(request.retention_days.is_none());
    }

    #[test]
    fn restore_verifies_integrity_unless_disabled() {
        let request: RestoreRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(request.verify_integrity());

        let request: RestoreRequest =
            serde_json::from_value(serde_json::json!({ "verify_integrity": false })).unwrap();
        assert!(!request.verify_integrity());
    }
}
