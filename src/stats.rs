//! Aggregate statistics over jobs and executions.
//!
//! Aggregation happens in memory over loaded rows so the same code serves
//! Postgres and SQLite.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{ExecutionStatus, backup_execution, backup_job};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BackupStatistics {
    pub total_jobs: u64,
    pub active_jobs: u64,
    /// COMPLETED or VERIFIED executions
    pub completed_backups: u64,
    pub failed_backups: u64,
    /// Bytes held by successful executions
    pub total_storage_used: u64,
    pub average_backup_time_ms: f64,
    /// Percentage of finished executions that succeeded
    pub success_rate: f64,
    pub last_backup_time: Option<DateTime<Utc>>,
    pub next_scheduled_backup: Option<DateTime<Utc>>,
    /// Storage location -> bytes
    pub storage_distribution: BTreeMap<String, u64>,
    /// Backup kind -> number of jobs
    pub type_distribution: BTreeMap<String, u64>,
}

pub fn compute(
    jobs: &[backup_job::Model],
    executions: &[backup_execution::Model],
    next_scheduled_backup: Option<DateTime<Utc>>,
) -> BackupStatistics {
    let mut stats = BackupStatistics {
        total_jobs: jobs.len() as u64,
        active_jobs: jobs.iter().filter(|j| j.active).count() as u64,
        next_scheduled_backup,
        ..BackupStatistics::default()
    };

    let locations: HashMap<Uuid, &str> = jobs
        .iter()
        .map(|j| (j.id, j.storage_location.as_str()))
        .collect();
    for job in jobs {
        *stats.type_distribution.entry(job.kind.clone()).or_default() += 1;
        stats.storage_distribution
            .entry(job.storage_location.clone())
            .or_default();
    }

    let mut total_duration_ms: i64 = 0;
    let mut timed_runs: i64 = 0;
    for execution in executions {
        match execution.status() {
            ExecutionStatus::Completed | ExecutionStatus::Verified => {
                stats.completed_backups += 1;
                let size = execution.size_bytes.unwrap_or(0).max(0) as u64;
                stats.total_storage_used += size;
                if let Some(location) = locations.get(&execution.job_id) {
                    *stats
                        .storage_distribution
                        .entry((*location).to_string())
                        .or_default() += size;
                }
                if let Some(duration) = execution.duration_ms {
                    total_duration_ms += duration;
                    timed_runs += 1;
                }
                let finished = execution
                    .ended_at
                    .unwrap_or_else(|| execution.reference_time())
                    .with_timezone(&Utc);
                stats.last_backup_time = stats.last_backup_time.max(Some(finished));
            }
            ExecutionStatus::Failed => stats.failed_backups += 1,
            _ => {}
        }
    }

    if timed_runs > 0 {
        stats.average_backup_time_ms = total_duration_ms as f64 / timed_runs as f64;
    }
    let finished = stats.completed_backups + stats.failed_backups;
    if finished > 0 {
        stats.success_rate = stats.completed_backups as f64 / finished as f64 * 100.0;
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job(kind: &str, location: &str, active: bool) -> backup_job::Model {
        let now = Utc::now().fixed_offset();
        backup_job::Model {
            id: Uuid::new_v4(),
            name: format!("{kind}-{location}"),
            kind: kind.into(),
            data_source: "database:postgresql://db/app".into(),
            schedule: None,
            timezone: None,
            retention_days: 30,
            compression: true,
            encryption: false,
            storage_location: location.into(),
            options: None,
            active,
            success_count: 0,
            failure_count: 0,
            total_bytes: 0,
            last_backup: None,
            next_backup: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn execution(
        job_id: Uuid,
        status: ExecutionStatus,
        size: i64,
        duration_ms: i64,
    ) -> backup_execution::Model {
        let now = Utc::now().fixed_offset();
        backup_execution::Model {
            id: Uuid::new_v4(),
            job_id,
            status: status.as_str().into(),
            triggered_by: "MANUAL".into(),
            started_at: Some(now - Duration::milliseconds(duration_ms)),
            ended_at: Some(now),
            duration_ms: Some(duration_ms),
            file_path: Some("/b/x".into()),
            size_bytes: Some(size),
            compressed_size_bytes: None,
            file_count: Some(1),
            checksum: None,
            verified: false,
            error_message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn aggregates_counts_sizes_and_rates() {
        let pg = job("FULL", "primary", true);
        let mongo = job("SNAPSHOT", "archive", false);
        let executions = vec![
            execution(pg.id, ExecutionStatus::Completed, 100, 1_000),
            execution(pg.id, ExecutionStatus::Verified, 300, 3_000),
            execution(mongo.id, ExecutionStatus::Completed, 50, 2_000),
            execution(pg.id, ExecutionStatus::Failed, 0, 10),
            execution(pg.id, ExecutionStatus::Running, 0, 0),
        ];

        let stats = compute(&[pg.clone(), mongo.clone()], &executions, None);

        assert_eq!(stats.total_jobs, 2);
        assert_eq!(stats.active_jobs, 1);
        assert_eq!(stats.completed_backups, 3);
        assert_eq!(stats.failed_backups, 1);
        assert_eq!(stats.total_storage_used, 450);
        assert_eq!(stats.average_backup_time_ms, 2_000.0);
        assert_eq!(stats.success_rate, 75.0);
        assert_eq!(stats.storage_distribution["primary"], 400);
        assert_eq!(stats.storage_distribution["archive"], 50);
        assert_eq!(stats.type_distribution["FULL"], 1);
        assert_eq!(stats.type_distribution["SNAPSHOT"], 1);
        assert!(stats.last_backup_time.is_some());
    }

    #[test]
    fn empty_inputs_produce_zeroes() {
        let stats = compute(&[], &[], None);
        assert_eq!(stats, BackupStatistics::default());
    }
}
