//! # Retention Manager
//!
//! Deletes expired backup artifacts and then their execution records.
//! Cleanup is best effort: a file that cannot be removed is reported in
//! `errors`, its record is kept, and the pass moves on.

use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::BackupError;
use crate::models::{backup_execution, backup_job, retention_policy};
use crate::repositories::{ExecutionRepository, JobRepository, RetentionPolicyRepository};

/// Day-count or bucket-count retention rules.
///
/// `retention_days` wins when present; otherwise the window is the widest
/// one implied by the counts (`keep_weekly` weeks, `keep_monthly` months of
/// 30 days, `keep_yearly` years of 365 days).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RetentionRules {
    pub retention_days: Option<u32>,
    pub keep_daily: Option<u32>,
    pub keep_weekly: Option<u32>,
    pub keep_monthly: Option<u32>,
    pub keep_yearly: Option<u32>,
}

fn from_column(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

impl RetentionRules {
    pub fn days(days: u32) -> Self {
        Self {
            retention_days: Some(days),
            ..Self::default()
        }
    }

    pub fn from_policy(policy: &retention_policy::Model) -> Self {
        Self {
            retention_days: from_column(policy.retention_days),
            keep_daily: from_column(policy.keep_daily),
            keep_weekly: from_column(policy.keep_weekly),
            keep_monthly: from_column(policy.keep_monthly),
            keep_yearly: from_column(policy.keep_yearly),
        }
    }

    pub fn window_days(&self) -> Option<u32> {
        self.retention_days.or_else(|| {
            [
                self.keep_daily,
                self.keep_weekly.map(|w| w.saturating_mul(7)),
                self.keep_monthly.map(|m| m.saturating_mul(30)),
                self.keep_yearly.map(|y| y.saturating_mul(365)),
            ]
            .into_iter()
            .flatten()
            .max()
        })
    }

    /// Executions that started before this instant are expired.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.window_days()
            .map(|days| now - Duration::days(i64::from(days)))
    }

    pub fn validate(&self) -> Result<(), BackupError> {
        match self.window_days() {
            None => Err(BackupError::invalid(
                "retention policy must set retention_days or at least one keep_* count",
            )),
            Some(0) => Err(BackupError::invalid("retention window must be at least one day")),
            Some(_) => Ok(()),
        }
    }
}

/// Executions a cleanup pass may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupScope {
    All,
    Job(Uuid),
}

impl CleanupScope {
    fn job_id(&self) -> Option<Uuid> {
        match self {
            CleanupScope::All => None,
            CleanupScope::Job(id) => Some(*id),
        }
    }
}

/// Caller input for a cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CleanupRequest {
    /// Overrides every stored policy for this run.
    pub retention_days: Option<u32>,
    #[serde(default)]
    pub dry_run: Option<bool>,
    pub job_id: Option<Uuid>,
    /// Restrict the run to jobs in this storage location.
    pub scope: Option<String>,
}

/// Totals of one cleanup pass. In a dry run the totals describe what would
/// have been deleted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CleanupReport {
    pub deleted_backups: u64,
    pub freed_space: u64,
    pub deleted_files: u64,
    pub errors: Vec<String>,
    pub dry_run: bool,
    /// Present when a single window applied to the whole pass.
    pub cutoff: Option<DateTime<Utc>>,
}

impl CleanupReport {
    fn new(dry_run: bool, cutoff: Option<DateTime<Utc>>) -> Self {
        Self {
            dry_run,
            cutoff,
            ..Self::default()
        }
    }

    fn absorb(&mut self, other: CleanupReport) {
        self.deleted_backups += other.deleted_backups;
        self.freed_space += other.freed_space;
        self.deleted_files += other.deleted_files;
        self.errors.extend(other.errors);
        if self.cutoff != other.cutoff {
            self.cutoff = None;
        }
    }
}

/// Whether the execution is old enough and no longer in progress.
pub fn is_expired(execution: &backup_execution::Model, cutoff: DateTime<Utc>) -> bool {
    !execution.status().is_in_progress() && execution.reference_time() < cutoff
}

#[derive(Debug, Clone)]
pub struct RetentionManager {
    jobs: JobRepository,
    executions: ExecutionRepository,
    policies: RetentionPolicyRepository,
    default_retention_days: u32,
}

impl RetentionManager {
    pub fn new(db: DatabaseConnection, default_retention_days: u32) -> Self {
        Self {
            jobs: JobRepository::new(db.clone()),
            executions: ExecutionRepository::new(db.clone()),
            policies: RetentionPolicyRepository::new(db),
            default_retention_days,
        }
    }

    /// Rules for `job`: explicit override, then the job's stored policy, then
    /// the job's own `retention_days` (0 means inherit), then the global
    /// policy, then the configured default.
    pub async fn effective_rules(
        &self,
        job: &backup_job::Model,
        explicit_days: Option<u32>,
    ) -> Result<RetentionRules, BackupError> {
        if let Some(days) = explicit_days {
            return Ok(RetentionRules::days(days));
        }
        if let Some(policy) = self.policies.find_for_job(job.id).await? {
            let rules = RetentionRules::from_policy(&policy);
            if rules.window_days().is_some() {
                return Ok(rules);
            }
        }
        if let Some(days) = from_column(Some(job.retention_days)).filter(|d| *d > 0) {
            return Ok(RetentionRules::days(days));
        }
        self.global_rules().await
    }

    async fn global_rules(&self) -> Result<RetentionRules, BackupError> {
        let global = self
            .policies
            .find_global()
            .await?
            .map(|p| RetentionRules::from_policy(&p))
            .filter(|r| r.window_days().is_some());
        Ok(global.unwrap_or_else(|| RetentionRules::days(self.default_retention_days)))
    }

    /// Jobs selected by `request`, each with the rules that apply to it.
    pub async fn plan(
        &self,
        request: &CleanupRequest,
    ) -> Result<Vec<(backup_job::Model, RetentionRules)>, BackupError> {
        if let Some(days) = request.retention_days {
            RetentionRules::days(days).validate()?;
        }

        let jobs = match request.job_id {
            Some(id) => vec![self.jobs.get(id).await?],
            None => self.jobs.list().await?,
        };

        let mut plan = Vec::with_capacity(jobs.len());
        for job in jobs {
            if request
                .scope
                .as_deref()
                .is_some_and(|location| location != job.storage_location)
            {
                continue;
            }
            let rules = self.effective_rules(&job, request.retention_days).await?;
            plan.push((job, rules));
        }
        Ok(plan)
    }

    /// Resolve policies for `request` and clean every selected job.
    #[instrument(skip_all, fields(job_id = ?request.job_id, dry_run = request.dry_run.unwrap_or(false)))]
    pub async fn run(&self, request: &CleanupRequest) -> Result<CleanupReport, BackupError> {
        let dry_run = request.dry_run.unwrap_or(false);
        let plan = self.plan(request).await?;

        let now = Utc::now();
        let mut report = CleanupReport::new(dry_run, None);
        for (index, (job, rules)) in plan.into_iter().enumerate() {
            let job_report = match self
                .cleanup_at(CleanupScope::Job(job.id), &rules, dry_run, now)
                .await
            {
                Ok(job_report) => job_report,
                Err(err) => {
                    warn!(job_id = %job.id, job_name = %job.name, error = %err, "Retention pass for job failed");
                    let mut failed = CleanupReport::new(dry_run, rules.cutoff(now));
                    failed
                        .errors
                        .push(format!("job '{}' ({}): {err}", job.name, job.id));
                    failed
                }
            };
            if index == 0 {
                report.cutoff = job_report.cutoff;
            }
            report.absorb(job_report);
        }

        Ok(report)
    }

    /// Delete executions in `scope` older than the cutoff of `rules`.
    pub async fn cleanup(
        &self,
        scope: CleanupScope,
        rules: &RetentionRules,
        dry_run: bool,
    ) -> Result<CleanupReport, BackupError> {
        self.cleanup_at(scope, rules, dry_run, Utc::now()).await
    }

    async fn cleanup_at(
        &self,
        scope: CleanupScope,
        rules: &RetentionRules,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Result<CleanupReport, BackupError> {
        rules.validate()?;
        let cutoff = rules
            .cutoff(now)
            .ok_or_else(|| BackupError::invalid("retention policy defines no window"))?;

        let candidates: Vec<_> = self
            .executions
            .list(scope.job_id())
            .await?
            .into_iter()
            .filter(|execution| is_expired(execution, cutoff))
            .collect();

        let mut report = CleanupReport::new(dry_run, Some(cutoff));
        for execution in &candidates {
            self.remove_execution(execution, dry_run, &mut report).await;
        }

        if !dry_run {
            counter!("backup_retention_deleted_total").increment(report.deleted_backups);
            counter!("backup_retention_freed_bytes_total").increment(report.freed_space);
        }
        if !report.errors.is_empty() {
            counter!("backup_retention_errors_total").increment(report.errors.len() as u64);
        }
        info!(
            job_id = ?scope.job_id(),
            cutoff = %cutoff,
            candidates = candidates.len(),
            deleted_backups = report.deleted_backups,
            freed_space = report.freed_space,
            errors = report.errors.len(),
            dry_run,
            "Retention cleanup finished"
        );
        Ok(report)
    }

    /// Number of expired executions still present for `job_id` (all jobs
    /// when `None`) under each job's effective rules.
    pub async fn expired_count(&self, job_id: Option<Uuid>) -> Result<usize, BackupError> {
        let plan = self
            .plan(&CleanupRequest {
                job_id,
                ..CleanupRequest::default()
            })
            .await?;

        let now = Utc::now();
        let mut expired = 0;
        for (job, rules) in plan {
            let Some(cutoff) = rules.cutoff(now) else {
                continue;
            };
            expired += self
                .executions
                .list(Some(job.id))
                .await?
                .iter()
                .filter(|execution| is_expired(execution, cutoff))
                .count();
        }
        Ok(expired)
    }

    async fn remove_execution(
        &self,
        execution: &backup_execution::Model,
        dry_run: bool,
        report: &mut CleanupReport,
    ) {
        let artifact = execution.file_path.as_deref().filter(|p| !p.is_empty());

        let mut freed = 0;
        let mut removed_file = false;
        if let Some(path) = artifact {
            match remove_artifact(Path::new(path), dry_run).await {
                Ok(Some(size)) => {
                    freed = size;
                    removed_file = true;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(execution_id = %execution.id, path, error = %err, "Failed to delete backup artifact");
                    report.errors.push(format!(
                        "execution {}: failed to delete {path}: {err}",
                        execution.id
                    ));
                    return;
                }
            }
        }

        if !dry_run && let Err(err) = self.executions.delete(execution.id).await {
            report.errors.push(format!(
                "execution {}: failed to delete record: {err}",
                execution.id
            ));
            // The file is gone even though the record stays.
            if removed_file {
                report.deleted_files += 1;
                report.freed_space += freed;
            }
            return;
        }

        report.deleted_backups += 1;
        if removed_file {
            report.deleted_files += 1;
            report.freed_space += freed;
        }
    }
}

/// Remove one artifact. `Ok(Some(size))` when a file was (or in a dry run
/// would be) deleted, `Ok(None)` when it was already absent.
async fn remove_artifact(path: &Path, dry_run: bool) -> std::io::Result<Option<u64>> {
    let size = match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    if dry_run {
        return Ok(Some(size));
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(Some(size)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}
