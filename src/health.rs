//! # Health Monitor
//!
//! [`evaluate`] turns a [`HealthSnapshot`] into a [`HealthReport`] without
//! touching persistence; [`HealthMonitor`] loads the snapshot.
//!
//! The overall status and the alerts use separate thresholds. Storage at
//! 78% raises a MEDIUM alert while the overall status is still HEALTHY, and
//! four failures in a week turn the status to WARNING without any failure
//! alert.

use chrono::{DateTime, Duration, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::BackupError;
use crate::models::{ExecutionStatus, backup_execution};
use crate::repositories::{ExecutionRepository, JobRepository};
use crate::retention::RetentionManager;

const SUCCESS_WINDOW_HOURS: i64 = 48;
const FAILURE_WINDOW_DAYS: i64 = 7;

const OVERALL_FAILURE_THRESHOLD: u64 = 3;
const OVERALL_STORAGE_PERCENT: f64 = 80.0;

const ALERT_STORAGE_CRITICAL_PERCENT: f64 = 90.0;
const ALERT_STORAGE_MEDIUM_PERCENT: f64 = 75.0;
const ALERT_FAILURE_THRESHOLD: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    StorageFull,
    BackupFailure,
    VerificationFailed,
    RetentionPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub message: String,
    pub severity: AlertSeverity,
}

impl Alert {
    fn new(alert_type: AlertType, severity: AlertSeverity, message: String) -> Self {
        Self {
            alert_type,
            message,
            severity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StorageCapacity {
    pub used: u64,
    pub total: u64,
    pub percentage: f64,
}

impl StorageCapacity {
    pub fn new(used: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            used as f64 / total as f64 * 100.0
        };
        Self {
            used,
            total,
            percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UpcomingBackup {
    pub job_id: Uuid,
    pub job_name: String,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HealthReport {
    pub overall: HealthStatus,
    pub last_successful_backup: Option<DateTime<Utc>>,
    /// Failed executions in the last 7 days
    pub failed_backup_count: u64,
    pub storage_capacity: StorageCapacity,
    pub upcoming_backups: Vec<UpcomingBackup>,
    pub alerts: Vec<Alert>,
    pub checked_at: DateTime<Utc>,
}

/// Facts the report is derived from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthSnapshot {
    pub last_successful_backup: Option<DateTime<Utc>>,
    pub failed_last_7_days: u64,
    pub corrupted_last_7_days: u64,
    pub expired_present: u64,
    pub storage_used: u64,
    pub storage_total: u64,
    pub upcoming: Vec<UpcomingBackup>,
}

impl HealthSnapshot {
    /// Fold execution rows into the execution-derived fields.
    pub fn from_executions(executions: &[backup_execution::Model], now: DateTime<Utc>) -> Self {
        let week_ago = now - Duration::days(FAILURE_WINDOW_DAYS);
        let mut snapshot = Self::default();

        for execution in executions {
            let status = execution.status();
            let at = execution.reference_time().with_timezone(&Utc);
            match status {
                ExecutionStatus::Completed | ExecutionStatus::Verified => {
                    let finished = execution
                        .ended_at
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or(at);
                    snapshot.last_successful_backup =
                        snapshot.last_successful_backup.max(Some(finished));
                }
                ExecutionStatus::Failed if at >= week_ago => snapshot.failed_last_7_days += 1,
                ExecutionStatus::Corrupted if at >= week_ago => {
                    snapshot.corrupted_last_7_days += 1
                }
                _ => {}
            }
            if execution.file_path.is_some() && status != ExecutionStatus::Failed {
                snapshot.storage_used += execution.size_bytes.unwrap_or(0).max(0) as u64;
            }
        }
        snapshot
    }
}

/// Derive the overall status and alerts from `snapshot`.
pub fn evaluate(snapshot: HealthSnapshot, now: DateTime<Utc>) -> HealthReport {
    let storage = StorageCapacity::new(snapshot.storage_used, snapshot.storage_total);
    let recent_success = snapshot
        .last_successful_backup
        .is_some_and(|at| at >= now - Duration::hours(SUCCESS_WINDOW_HOURS));
    let failures = snapshot.failed_last_7_days;

    let overall = if !recent_success {
        HealthStatus::Critical
    } else if failures > OVERALL_FAILURE_THRESHOLD || storage.percentage > OVERALL_STORAGE_PERCENT
    {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    };

    let mut alerts = Vec::new();
    if storage.percentage > ALERT_STORAGE_CRITICAL_PERCENT {
        alerts.push(Alert::new(
            AlertType::StorageFull,
            AlertSeverity::Critical,
            format!("Backup storage is {:.1}% full", storage.percentage),
        ));
    } else if storage.percentage > ALERT_STORAGE_MEDIUM_PERCENT {
        alerts.push(Alert::new(
            AlertType::StorageFull,
            AlertSeverity::Medium,
            format!("Backup storage is {:.1}% full", storage.percentage),
        ));
    }
    if failures > ALERT_FAILURE_THRESHOLD {
        alerts.push(Alert::new(
            AlertType::BackupFailure,
            AlertSeverity::High,
            format!("{failures} backups failed in the last {FAILURE_WINDOW_DAYS} days"),
        ));
    }
    if !recent_success {
        alerts.push(Alert::new(
            AlertType::BackupFailure,
            AlertSeverity::Critical,
            format!("No successful backup in the last {SUCCESS_WINDOW_HOURS} hours"),
        ));
    }
    if snapshot.corrupted_last_7_days > 0 {
        alerts.push(Alert::new(
            AlertType::VerificationFailed,
            AlertSeverity::High,
            format!(
                "{} backups failed integrity verification in the last {FAILURE_WINDOW_DAYS} days",
                snapshot.corrupted_last_7_days
            ),
        ));
    }
    if snapshot.expired_present > 0 {
        alerts.push(Alert::new(
            AlertType::RetentionPolicy,
            AlertSeverity::Low,
            format!(
                "{} backups are older than their retention window",
                snapshot.expired_present
            ),
        ));
    }

    HealthReport {
        overall,
        last_successful_backup: snapshot.last_successful_backup,
        failed_backup_count: failures,
        storage_capacity: storage,
        upcoming_backups: snapshot.upcoming,
        alerts,
        checked_at: now,
    }
}

/// Loads health snapshots from persistence.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    jobs: JobRepository,
    executions: ExecutionRepository,
    retention: RetentionManager,
    capacity_bytes: u64,
}

impl HealthMonitor {
    pub fn new(db: DatabaseConnection, retention: RetentionManager, capacity_bytes: u64) -> Self {
        Self {
            jobs: JobRepository::new(db.clone()),
            executions: ExecutionRepository::new(db),
            retention,
            capacity_bytes,
        }
    }

    /// Health of one job, or of the whole system when `job_id` is `None`.
    pub async fn check(
        &self,
        job_id: Option<Uuid>,
        upcoming: Vec<UpcomingBackup>,
    ) -> Result<HealthReport, BackupError> {
        if let Some(id) = job_id {
            self.jobs.get(id).await?;
        }
        let now = Utc::now();

        let executions = self.executions.list(job_id).await?;
        let mut snapshot = HealthSnapshot::from_executions(&executions, now);
        snapshot.storage_total = self.capacity_bytes;
        snapshot.upcoming = upcoming
            .into_iter()
            .filter(|u| job_id.is_none_or(|id| id == u.job_id))
            .collect();
        snapshot.expired_present = match self.retention.expired_count(job_id).await {
            Ok(count) => count as u64,
            Err(err) => {
                warn!(error = %err, "Could not count expired backups for health report");
                0
            }
        };

        Ok(evaluate(snapshot, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy(now: DateTime<Utc>) -> HealthSnapshot {
        HealthSnapshot {
            last_successful_backup: Some(now - Duration::hours(2)),
            storage_used: 10,
            storage_total: 100,
            ..HealthSnapshot::default()
        }
    }

    fn alert_kinds(report: &HealthReport) -> Vec<(AlertType, AlertSeverity)> {
        report
            .alerts
            .iter()
            .map(|a| (a.alert_type, a.severity))
            .collect()
    }

    #[test]
    fn recent_success_and_low_usage_is_healthy() {
        let now = Utc::now();
        let report = evaluate(healthy(now), now);
        assert_eq!(report.overall, HealthStatus::Healthy);
        assert!(report.alerts.is_empty());
        assert_eq!(report.storage_capacity.percentage, 10.0);
    }

    #[test]
    fn no_success_in_48_hours_is_critical_with_alert() {
        let now = Utc::now();
        let report = evaluate(
            HealthSnapshot {
                last_successful_backup: Some(now - Duration::hours(49)),
                ..healthy(now)
            },
            now,
        );
        assert_eq!(report.overall, HealthStatus::Critical);
        assert_eq!(
            alert_kinds(&report),
            vec![(AlertType::BackupFailure, AlertSeverity::Critical)]
        );

        let never = evaluate(HealthSnapshot::default(), now);
        assert_eq!(never.overall, HealthStatus::Critical);
    }

    #[test]
    fn four_failures_warn_without_a_failure_alert() {
        let now = Utc::now();
        let report = evaluate(
            HealthSnapshot {
                failed_last_7_days: 4,
                ..healthy(now)
            },
            now,
        );
        assert_eq!(report.overall, HealthStatus::Warning);
        assert!(report.alerts.is_empty());
        assert_eq!(report.failed_backup_count, 4);
    }

    #[test]
    fn six_failures_raise_high_alert() {
        let now = Utc::now();
        let report = evaluate(
            HealthSnapshot {
                failed_last_7_days: 6,
                ..healthy(now)
            },
            now,
        );
        assert_eq!(report.overall, HealthStatus::Warning);
        assert_eq!(
            alert_kinds(&report),
            vec![(AlertType::BackupFailure, AlertSeverity::High)]
        );
    }

    #[test]
    fn storage_thresholds_differ_between_status_and_alerts() {
        let now = Utc::now();
        let at = |used| {
            evaluate(
                HealthSnapshot {
                    storage_used: used,
                    ..healthy(now)
                },
                now,
            )
        };

        let seventy_eight = at(78);
        assert_eq!(seventy_eight.overall, HealthStatus::Healthy);
        assert_eq!(
            alert_kinds(&seventy_eight),
            vec![(AlertType::StorageFull, AlertSeverity::Medium)]
        );

        let eighty_five = at(85);
        assert_eq!(eighty_five.overall, HealthStatus::Warning);
        assert_eq!(
            alert_kinds(&eighty_five),
            vec![(AlertType::StorageFull, AlertSeverity::Medium)]
        );

        let ninety_five = at(95);
        assert_eq!(
            alert_kinds(&ninety_five),
            vec![(AlertType::StorageFull, AlertSeverity::Critical)]
        );
    }

    #[test]
    fn verification_and_retention_alerts() {
        let now = Utc::now();
        let report = evaluate(
            HealthSnapshot {
                corrupted_last_7_days: 1,
                expired_present: 3,
                ..healthy(now)
            },
            now,
        );
        assert_eq!(report.overall, HealthStatus::Healthy);
        assert_eq!(
            alert_kinds(&report),
            vec![
                (AlertType::VerificationFailed, AlertSeverity::High),
                (AlertType::RetentionPolicy, AlertSeverity::Low),
            ]
        );
    }

    #[test]
    fn zero_capacity_reports_zero_percent() {
        assert_eq!(StorageCapacity::new(500, 0).percentage, 0.0);
    }
}
