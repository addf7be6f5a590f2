//! # Backup Orchestrator
//!
//! The façade over jobs, executions, strategies, the scheduler and the
//! retention/health components. At most one execution per job runs at a
//! time: a job id is claimed in the in-flight set before its execution
//! record is created and released when the outcome has been recorded.

pub mod types;

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::checksum::ChecksumVerifier;
use crate::config::{AppConfig, redact_url_credentials};
use crate::error::BackupError;
use crate::health::{HealthMonitor, HealthReport, UpcomingBackup};
use crate::models::{
    ExecutionStatus, ExecutionTrigger, RestoreStatus, backup_execution, backup_job,
    restore_history, retention_policy,
};
use crate::repositories::{
    ExecutionRepository, JobRepository, NewBackupJob, RestoreHistoryRepository, RestoreRecord,
    RetentionPolicyRepository,
};
use crate::retention::{CleanupReport, CleanupRequest, CleanupScope, RetentionManager, RetentionRules};
use crate::scheduler::{BackupScheduler, JobSchedule, ScheduledBackupRunner};
use crate::stats::{self, BackupStatistics};
use crate::strategies::{
    BackupOptions, BackupStrategy, DataSource, RestoreOptions, StrategyError, StrategyRegistry,
};
use crate::telemetry::{self, TraceContext};

pub use types::{
    CreateJobRequest, ExecutionView, JobDeletion, JobView, RescheduleRequest, RestoreOutcome,
    RestoreRecordView, RestoreRequest, RetentionPolicyView,
};

const UPCOMING_LIMIT: usize = 10;

/// Releases a job's in-flight claim when dropped.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    job_id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.job_id);
    }
}

/// Everything needed to run one execution of a validated job.
struct PreparedRun {
    job: backup_job::Model,
    strategy: Arc<dyn BackupStrategy>,
    options: BackupOptions,
}

pub struct BackupOrchestrator {
    config: Arc<AppConfig>,
    jobs: JobRepository,
    executions: ExecutionRepository,
    restores: RestoreHistoryRepository,
    policies: RetentionPolicyRepository,
    strategies: StrategyRegistry,
    scheduler: Arc<BackupScheduler>,
    retention: RetentionManager,
    health: HealthMonitor,
    verifier: ChecksumVerifier,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    this: Weak<BackupOrchestrator>,
}

impl BackupOrchestrator {
    /// Build the orchestrator and attach it to `scheduler` as the runner
    /// its timers call.
    pub fn new(
        db: DatabaseConnection,
        config: Arc<AppConfig>,
        strategies: StrategyRegistry,
        scheduler: Arc<BackupScheduler>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let runner: Weak<dyn ScheduledBackupRunner> = this.clone();
            scheduler.attach_runner(runner);

            let retention =
                RetentionManager::new(db.clone(), config.storage.default_retention_days);
            Self {
                jobs: JobRepository::new(db.clone()),
                executions: ExecutionRepository::new(db.clone()),
                restores: RestoreHistoryRepository::new(db.clone()),
                policies: RetentionPolicyRepository::new(db.clone()),
                health: HealthMonitor::new(db, retention.clone(), config.storage.capacity_bytes),
                retention,
                strategies,
                scheduler,
                verifier: ChecksumVerifier::new(),
                in_flight: Arc::new(Mutex::new(HashSet::new())),
                this: this.clone(),
                config,
            }
        })
    }

    pub fn scheduler(&self) -> &Arc<BackupScheduler> {
        &self.scheduler
    }

    /// Startup recovery: close executions a previous process left in
    /// progress and rebuild the scheduler from persisted jobs. Returns the
    /// number of live timers.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<usize, BackupError> {
        let closed = self.executions.close_interrupted(Utc::now()).await?;
        if closed > 0 {
            warn!(executions = closed, "Closed executions interrupted by restart");
        }

        let jobs = self.jobs.list_schedulable().await?;
        let timers = self.scheduler.rebuild(&jobs);

        for job in jobs {
            let next = self.scheduler.next_run(job.id);
            if job.next_backup.map(|t| t.with_timezone(&Utc)) != next {
                let job_id = job.id;
                if let Err(err) = self.jobs.set_next_backup(job, next).await {
                    warn!(job_id = %job_id, error = %err, "Failed to refresh next backup time");
                }
            }
        }

        info!(timers, "Backup orchestrator initialized");
        Ok(timers)
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    // ----------------------------------------------------------------------
    // Jobs
    // ----------------------------------------------------------------------

    #[instrument(skip_all, fields(job_name = %request.name))]
    pub async fn create_job(
        &self,
        request: CreateJobRequest,
    ) -> Result<backup_job::Model, BackupError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(BackupError::invalid("job name must not be empty"));
        }
        if self.jobs.find_by_name(&name).await?.is_some() {
            return Err(BackupError::invalid(format!(
                "a backup job named '{name}' already exists"
            )));
        }
        if request.encryption {
            return Err(BackupError::invalid(
                "artifact encryption is not supported; use storage-level encryption",
            ));
        }
        self.strategies
            .resolve(&request.data_source)
            .map_err(|err| BackupError::invalid(err.to_string()))?;
        storage_dir(&self.config.storage.root, &request.storage_location)?;

        let schedule = normalized(request.schedule);
        let timezone = normalized(request.timezone);
        let next_backup = match &schedule {
            Some(expression) if request.active => {
                JobSchedule::parse(expression, timezone.as_deref())?.next_after(Utc::now())
            }
            Some(expression) => {
                JobSchedule::parse(expression, timezone.as_deref())?;
                None
            }
            None => None,
        };

        let retention_days = match request.retention_days {
            Some(0) => return Err(BackupError::invalid("retention_days must be at least 1")),
            Some(days) => i32::try_from(days)
                .map_err(|_| BackupError::invalid("retention_days is out of range"))?,
            None => 0,
        };
        let options = request
            .options
            .map(serde_json::to_value)
            .transpose()
            .map_err(|err| BackupError::invalid(format!("invalid backup options: {err}")))?;

        let job = self
            .jobs
            .create(
                NewBackupJob {
                    name,
                    kind: request.kind.as_str().to_string(),
                    data_source: request.data_source.trim().to_string(),
                    schedule,
                    timezone,
                    retention_days,
                    compression: request.compression,
                    encryption: false,
                    storage_location: request.storage_location.trim().to_string(),
                    options,
                    active: request.active,
                },
                next_backup,
            )
            .await?;

        if let Err(err) = self.scheduler.schedule_job(&job) {
            warn!(job_id = %job.id, error = %err, "Job created but could not be scheduled");
        }
        counter!("backup_jobs_created_total").increment(1);
        Ok(job)
    }

    pub async fn list_jobs(&self) -> Result<Vec<backup_job::Model>, BackupError> {
        self.jobs.list().await
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<backup_job::Model, BackupError> {
        self.jobs.get(job_id).await
    }

    /// Flip the active flag, starting or stopping the job's timer.
    #[instrument(skip(self))]
    pub async fn toggle_job(&self, job_id: Uuid) -> Result<backup_job::Model, BackupError> {
        let job = self.jobs.get(job_id).await?;
        let active = !job.active;

        let next_backup = match job.schedule.as_deref() {
            Some(expression) if active => {
                JobSchedule::parse(expression, job.timezone.as_deref())?.next_after(Utc::now())
            }
            _ => None,
        };

        let job = self.jobs.set_active(job, active, next_backup).await?;
        if job.active {
            self.scheduler.schedule_job(&job)?;
        } else {
            self.scheduler.unschedule_job(job.id);
        }

        info!(job_id = %job.id, active = job.active, "Backup job toggled");
        Ok(job)
    }

    /// Replace the job's schedule. Validation happens before anything is
    /// changed, so an invalid expression leaves the old timer running.
    #[instrument(skip(self, request))]
    pub async fn reschedule_job(
        &self,
        job_id: Uuid,
        request: RescheduleRequest,
    ) -> Result<backup_job::Model, BackupError> {
        let job = self.jobs.get(job_id).await?;
        let schedule = normalized(request.schedule);
        let timezone = normalized(request.timezone);

        let parsed = schedule
            .as_deref()
            .map(|expression| JobSchedule::parse(expression, timezone.as_deref()))
            .transpose()?;
        let next_backup = parsed
            .filter(|_| job.active)
            .and_then(|s| s.next_after(Utc::now()));

        let job = self
            .jobs
            .set_schedule(job, schedule, timezone, next_backup)
            .await?;
        self.scheduler.unschedule_job(job.id);
        self.scheduler.schedule_job(&job)?;

        info!(job_id = %job.id, schedule = ?job.schedule, "Backup job rescheduled");
        Ok(job)
    }

    /// Unschedule, remove artifacts (best effort) and delete the job with
    /// its executions.
    #[instrument(skip(self))]
    pub async fn delete_job(&self, job_id: Uuid) -> Result<JobDeletion, BackupError> {
        let job = self.jobs.get(job_id).await?;
        // Held until the row is gone so no run can start against it.
        let _guard = self.claim(&job)?;

        self.scheduler.unschedule_job(job.id);

        let executions = self.executions.list(Some(job.id)).await?;
        let mut deletion = JobDeletion {
            job_id: job.id,
            deleted_executions: executions.len() as u64,
            ..JobDeletion::default()
        };
        for path in executions.iter().filter_map(|e| e.file_path.as_deref()) {
            match tokio::fs::remove_file(path).await {
                Ok(()) => deletion.removed_files += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(job_id = %job.id, path, error = %err, "Failed to remove artifact of deleted job");
                    deletion.errors.push(format!("{path}: {err}"));
                }
            }
        }

        self.jobs.delete(job.id).await?;
        info!(
            job_id = %job.id,
            job_name = %job.name,
            executions = deletion.deleted_executions,
            files = deletion.removed_files,
            "Backup job deleted"
        );
        Ok(deletion)
    }

    /// Store the retention policy for a job, or the global one when
    /// `job_id` is `None`.
    pub async fn set_retention_policy(
        &self,
        job_id: Option<Uuid>,
        rules: RetentionRules,
    ) -> Result<retention_policy::Model, BackupError> {
        rules.validate()?;
        if let Some(id) = job_id {
            self.jobs.get(id).await?;
        }
        self.policies.upsert(job_id, &rules).await
    }

    // ----------------------------------------------------------------------
    // Executions
    // ----------------------------------------------------------------------

    /// Run a backup of `job_id` now and wait for it to finish.
    ///
    /// A failed run is recorded first and then returned as
    /// [`BackupError::ExecutionFailure`].
    pub async fn execute_backup(
        &self,
        job_id: Uuid,
    ) -> Result<backup_execution::Model, BackupError> {
        self.execute_with_trigger(job_id, ExecutionTrigger::Manual)
            .await
    }

    /// Start a backup of `job_id` in the background and return its PENDING
    /// execution.
    #[instrument(skip(self))]
    pub async fn trigger_backup(
        &self,
        job_id: Uuid,
    ) -> Result<backup_execution::Model, BackupError> {
        let this = self
            .this
            .upgrade()
            .ok_or_else(|| BackupError::invalid("orchestrator is shutting down"))?;

        let prepared = self.prepare(job_id).await?;
        let guard = self.claim_existing(&prepared.job).await?;
        let execution = self
            .executions
            .create_pending(prepared.job.id, ExecutionTrigger::Manual)
            .await?;

        let context = telemetry::current_trace_id()
            .map(|trace_id| TraceContext { trace_id })
            .unwrap_or_else(|| TraceContext::generate("manual"));
        let execution_id = execution.id;
        tokio::spawn(telemetry::with_trace_context(context, async move {
            if let Err(err) = this.run_claimed(prepared, execution_id, guard).await {
                error!(job_id = %job_id, execution_id = %execution_id, error = %err, "Triggered backup failed");
            }
        }));

        Ok(execution)
    }

    async fn execute_with_trigger(
        &self,
        job_id: Uuid,
        trigger: ExecutionTrigger,
    ) -> Result<backup_execution::Model, BackupError> {
        let prepared = self.prepare(job_id).await?;
        let guard = self.claim_existing(&prepared.job).await?;
        let execution = self
            .executions
            .create_pending(prepared.job.id, trigger)
            .await?;
        self.run_claimed(prepared, execution.id, guard).await
    }

    /// Checks that must pass before any execution record exists.
    async fn prepare(&self, job_id: Uuid) -> Result<PreparedRun, BackupError> {
        let job = self.jobs.get(job_id).await?;
        if !job.active {
            return Err(BackupError::invalid(format!(
                "backup job '{}' ({}) is not active",
                job.name, job.id
            )));
        }
        if job.storage_location.trim().is_empty() {
            return Err(BackupError::invalid(format!(
                "backup job '{}' ({}) has no storage location",
                job.name, job.id
            )));
        }
        storage_dir(&self.config.storage.root, &job.storage_location)?;

        let strategy = self.strategies.resolve(&job.data_source).map_err(|err| {
            BackupError::invalid(format!("backup job '{}' ({}): {err}", job.name, job.id))
        })?;

        let mut options: BackupOptions = match &job.options {
            Some(value) => serde_json::from_value(value.clone()).map_err(|err| {
                BackupError::invalid(format!(
                    "backup job '{}' ({}) has invalid options: {err}",
                    job.name, job.id
                ))
            })?,
            None => BackupOptions::default(),
        };
        options.compression.get_or_insert(job.compression);

        Ok(PreparedRun {
            job,
            strategy,
            options,
        })
    }

    fn claim(&self, job: &backup_job::Model) -> Result<InFlightGuard, BackupError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(job.id) {
            counter!("backup_executions_rejected_total").increment(1);
            return Err(BackupError::AlreadyRunning {
                job_id: job.id,
                job_name: job.name.clone(),
            });
        }
        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            job_id: job.id,
        })
    }

    /// Claim `job` and confirm it still exists. A deletion holds the same
    /// claim, so a job that passes this check stays until the guard drops.
    async fn claim_existing(
        &self,
        job: &backup_job::Model,
    ) -> Result<InFlightGuard, BackupError> {
        let guard = self.claim(job)?;
        self.jobs.get(job.id).await?;
        Ok(guard)
    }

    #[instrument(skip_all, fields(job_id = %prepared.job.id, execution_id = %execution_id))]
    async fn run_claimed(
        &self,
        prepared: PreparedRun,
        execution_id: Uuid,
        guard: InFlightGuard,
    ) -> Result<backup_execution::Model, BackupError> {
        let PreparedRun {
            job,
            strategy,
            options,
        } = prepared;

        if let Err(err) = self.executions.mark_running(execution_id).await {
            let current = self.executions.find(execution_id).await?;
            if current.is_some_and(|e| e.status() == ExecutionStatus::Cancelled) {
                info!("Execution cancelled before it started");
            }
            return Err(err);
        }

        let started = Utc::now();
        let output_path = output_path(
            &self.config.storage.root,
            &job,
            strategy.artifact_extension(&options),
            execution_id,
            started,
        );
        info!(job_name = %job.name, output = %output_path.display(), "Backup started");

        let outcome = strategy
            .execute(&job.data_source, &output_path, &options)
            .await;
        let finished = self.executions.finish(execution_id, &outcome).await?;

        self.jobs
            .record_outcome(
                job.id,
                outcome.is_success(),
                outcome.size_bytes,
                outcome.ended_at,
                self.scheduler.next_run(job.id),
            )
            .await?;
        drop(guard);

        counter!("backup_executions_total", "status" => outcome.status.as_str()).increment(1);
        histogram!("backup_execution_duration_ms").record(outcome.duration_ms as f64);

        if !outcome.is_success() {
            let message = outcome
                .error_message
                .unwrap_or_else(|| "backup failed without a message".to_string());
            error!(job_name = %job.name, error = %message, "Backup failed");
            return Err(BackupError::ExecutionFailure {
                job_id: job.id,
                job_name: job.name,
                execution_id,
                message,
            });
        }

        info!(
            job_name = %job.name,
            size_bytes = outcome.size_bytes,
            duration_ms = outcome.duration_ms,
            "Backup completed"
        );

        if self.config.storage.auto_cleanup {
            self.opportunistic_cleanup(&job).await;
        }
        Ok(finished)
    }

    async fn opportunistic_cleanup(&self, job: &backup_job::Model) {
        let result = match self.retention.effective_rules(job, None).await {
            Ok(rules) => {
                self.retention
                    .cleanup(CleanupScope::Job(job.id), &rules, false)
                    .await
            }
            Err(err) => Err(err),
        };
        match result {
            Ok(report) if !report.errors.is_empty() => {
                warn!(job_id = %job.id, errors = ?report.errors, "Retention cleanup after backup reported errors");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "Retention cleanup after backup failed");
            }
        }
    }

    pub async fn list_executions(
        &self,
        job_id: Option<Uuid>,
    ) -> Result<Vec<backup_execution::Model>, BackupError> {
        if let Some(id) = job_id {
            self.jobs.get(id).await?;
        }
        self.executions.list(job_id).await
    }

    pub async fn get_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<backup_execution::Model, BackupError> {
        self.executions.get(execution_id).await
    }

    /// Cancel an execution that has not started yet.
    pub async fn cancel_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<backup_execution::Model, BackupError> {
        let execution = self.executions.get(execution_id).await?;
        let status = execution.status();
        if status != ExecutionStatus::Pending {
            return Err(BackupError::invalid(format!(
                "execution {execution_id} is {status}; only PENDING executions can be cancelled"
            )));
        }
        let cancelled = self.executions.cancel(execution_id).await?;
        info!(execution_id = %execution_id, "Execution cancelled");
        Ok(cancelled)
    }

    /// Delete the artifact, then the record. The record stays when the
    /// artifact cannot be removed.
    pub async fn delete_execution(&self, execution_id: Uuid) -> Result<(), BackupError> {
        let execution = self.executions.get(execution_id).await?;
        if execution.status().is_in_progress() {
            return Err(BackupError::invalid(format!(
                "execution {execution_id} is {}; in-progress executions cannot be deleted",
                execution.status
            )));
        }

        if let Some(path) = execution.file_path.as_deref().filter(|p| !p.is_empty()) {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(BackupError::Filesystem {
                        path: PathBuf::from(path),
                        source,
                    });
                }
            }
        }

        self.executions.delete(execution_id).await?;
        info!(execution_id = %execution_id, job_id = %execution.job_id, "Execution deleted");
        Ok(())
    }

    /// Recompute the artifact checksum: a match marks the execution
    /// VERIFIED, a mismatch or unreadable artifact marks it CORRUPTED.
    #[instrument(skip(self))]
    pub async fn verify_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<backup_execution::Model, BackupError> {
        let execution = self.executions.get(execution_id).await?;
        let status = execution.status();
        if !status.is_successful() {
            return Err(BackupError::invalid(format!(
                "execution {execution_id} is {status}; only COMPLETED or VERIFIED backups can be verified"
            )));
        }
        let (Some(path), Some(expected)) = (
            execution.file_path.as_deref().filter(|p| !p.is_empty()),
            execution.checksum.as_deref(),
        ) else {
            return Err(BackupError::invalid(format!(
                "execution {execution_id} has no artifact checksum to verify"
            )));
        };

        if self.verifier.verify(Path::new(path), expected).await {
            counter!("backup_verifications_total", "result" => "verified").increment(1);
            return match status {
                ExecutionStatus::Completed => {
                    self.executions
                        .mark_verified(execution_id, status)
                        .await
                }
                _ => Ok(execution),
            };
        }

        counter!("backup_verifications_total", "result" => "corrupted").increment(1);
        warn!(execution_id = %execution_id, path, "Backup artifact failed verification");
        self.executions
            .mark_corrupted(
                execution_id,
                status,
                format!("checksum of {path} does not match recorded value {expected}"),
            )
            .await
    }

    // ----------------------------------------------------------------------
    // Restore
    // ----------------------------------------------------------------------

    /// Restore a COMPLETED or VERIFIED execution into its job's data source
    /// or `request.target_database`.
    #[instrument(skip(self, request), fields(dry_run = request.dry_run))]
    pub async fn restore_from_backup(
        &self,
        execution_id: Uuid,
        request: RestoreRequest,
    ) -> Result<RestoreOutcome, BackupError> {
        let execution = self.executions.get(execution_id).await?;
        let status = execution.status();
        if !status.is_successful() {
            return Err(BackupError::invalid(format!(
                "execution {execution_id} is {status}; only COMPLETED or VERIFIED backups can be restored"
            )));
        }
        let job = self.jobs.get(execution.job_id).await?;

        let artifact = execution
            .file_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                BackupError::invalid(format!("execution {execution_id} has no backup artifact"))
            })?;
        if !tokio::fs::try_exists(&artifact).await.unwrap_or(false) {
            return Err(BackupError::NotFound {
                entity: "backup artifact",
                id: artifact.display().to_string(),
            });
        }

        let target = request
            .target_database
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&job.data_source)
            .to_string();
        let strategy = self.restore_strategy(&job, &target)?;

        let mut integrity_verified = false;
        if request.verify_integrity() {
            match execution.checksum.as_deref() {
                Some(expected) => {
                    if !self.verifier.verify(&artifact, expected).await {
                        return Err(self
                            .integrity_failure(&execution, status, &artifact, expected)
                            .await);
                    }
                    integrity_verified = true;
                }
                None => {
                    warn!(execution_id = %execution_id, "No checksum recorded; restoring without integrity check");
                }
            }
        }

        let started_at = Utc::now();
        let redacted_target = redact_url_credentials(&target);
        let recorded_options = serde_json::json!({
            "overwrite_existing": request.overwrite_existing,
            "skip_errors": request.skip_errors,
            "verify_integrity": request.verify_integrity(),
            "dry_run": request.dry_run,
            "parallel_threads": request.parallel_threads,
        });

        if request.dry_run {
            let record = self
                .restores
                .append(RestoreRecord {
                    execution_id,
                    job_id: job.id,
                    target: redacted_target.clone(),
                    status: RestoreStatus::DryRun,
                    options: recorded_options,
                    warnings: Vec::new(),
                    error_message: None,
                    started_at,
                    ended_at: Utc::now(),
                })
                .await?;
            return Ok(RestoreOutcome {
                restore_id: record.id,
                execution_id,
                job_id: job.id,
                status: RestoreStatus::DryRun,
                target: redacted_target,
                integrity_verified,
                duration_ms: record.duration_ms,
                warnings: Vec::new(),
            });
        }

        let restore_options = RestoreOptions {
            overwrite_existing: request.overwrite_existing,
            skip_errors: request.skip_errors,
            parallel_threads: request.parallel_threads,
        };
        info!(execution_id = %execution_id, target = %redacted_target, "Restore started");
        let result = strategy.restore(&artifact, &target, &restore_options).await;
        let ended_at = Utc::now();

        let (restore_status, warnings, failure) = match result {
            Ok(result) if result.success => (RestoreStatus::Succeeded, result.warnings, None),
            Ok(result) => {
                let message = result
                    .error_message
                    .unwrap_or_else(|| "restore failed without a message".to_string());
                let failure = BackupError::ExecutionFailure {
                    job_id: job.id,
                    job_name: job.name.clone(),
                    execution_id,
                    message: format!("restore failed: {message}"),
                };
                (RestoreStatus::Failed, result.warnings, Some((message, failure)))
            }
            Err(err) => {
                let message = err.to_string();
                let failure = match err {
                    StrategyError::ArtifactMissing(path) => BackupError::NotFound {
                        entity: "backup artifact",
                        id: path.display().to_string(),
                    },
                    StrategyError::InvalidTarget(reason) => BackupError::invalid(reason),
                    StrategyError::Process(_) => BackupError::ExecutionFailure {
                        job_id: job.id,
                        job_name: job.name.clone(),
                        execution_id,
                        message: format!("restore failed: {message}"),
                    },
                };
                (RestoreStatus::Failed, Vec::new(), Some((message, failure)))
            }
        };

        let record = self
            .restores
            .append(RestoreRecord {
                execution_id,
                job_id: job.id,
                target: redacted_target.clone(),
                status: restore_status,
                options: recorded_options,
                warnings: warnings.clone(),
                error_message: failure.as_ref().map(|(message, _)| message.clone()),
                started_at,
                ended_at,
            })
            .await?;
        counter!("backup_restores_total", "status" => restore_status.as_str()).increment(1);

        if let Some((message, failure)) = failure {
            error!(execution_id = %execution_id, error = %message, "Restore failed");
            return Err(failure);
        }

        info!(execution_id = %execution_id, duration_ms = record.duration_ms, warnings = warnings.len(), "Restore completed");
        Ok(RestoreOutcome {
            restore_id: record.id,
            execution_id,
            job_id: job.id,
            status: restore_status,
            target: redacted_target,
            integrity_verified,
            duration_ms: record.duration_ms,
            warnings,
        })
    }

    /// Strategy for restoring `job`'s artifacts into `target`; both must
    /// belong to the same family.
    fn restore_strategy(
        &self,
        job: &backup_job::Model,
        target: &str,
    ) -> Result<Arc<dyn BackupStrategy>, BackupError> {
        let source = DataSource::parse(&job.data_source)
            .map_err(|err| BackupError::invalid(err.to_string()))?;
        let destination =
            DataSource::parse(target).map_err(|err| BackupError::invalid(err.to_string()))?;
        if source.family != destination.family {
            return Err(BackupError::invalid(format!(
                "cannot restore a {} backup into a {} target",
                source.family, destination.family
            )));
        }
        self.strategies
            .get(destination.family)
            .map_err(|err| BackupError::invalid(err.to_string()))
    }

    /// Mark the execution CORRUPTED and build the error returned to the
    /// caller.
    async fn integrity_failure(
        &self,
        execution: &backup_execution::Model,
        status: ExecutionStatus,
        artifact: &Path,
        expected: &str,
    ) -> BackupError {
        counter!("backup_integrity_failures_total").increment(1);
        error!(
            execution_id = %execution.id,
            path = %artifact.display(),
            "Backup artifact checksum mismatch; restore aborted"
        );
        if let Err(err) = self
            .executions
            .mark_corrupted(
                execution.id,
                status,
                format!(
                    "checksum of {} does not match recorded value {expected}",
                    artifact.display()
                ),
            )
            .await
        {
            warn!(execution_id = %execution.id, error = %err, "Failed to mark execution corrupted");
        }
        BackupError::IntegrityFailure {
            execution_id: execution.id,
            path: artifact.to_path_buf(),
            expected: expected.to_string(),
        }
    }

    pub async fn list_restores(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<restore_history::Model>, BackupError> {
        self.executions.get(execution_id).await?;
        self.restores.list_for_execution(execution_id).await
    }

    // ----------------------------------------------------------------------
    // Maintenance and reporting
    // ----------------------------------------------------------------------

    pub async fn cleanup(&self, request: CleanupRequest) -> Result<CleanupReport, BackupError> {
        let report = self.retention.run(&request).await?;
        counter!("backup_cleanup_runs_total").increment(1);
        Ok(report)
    }

    pub async fn statistics(&self, job_id: Option<Uuid>) -> Result<BackupStatistics, BackupError> {
        let jobs = match job_id {
            Some(id) => vec![self.jobs.get(id).await?],
            None => self.jobs.list().await?,
        };
        let executions = self.executions.list(job_id).await?;
        let next = self
            .scheduler
            .upcoming(usize::MAX)
            .into_iter()
            .filter(|(id, _)| job_id.is_none_or(|wanted| wanted == *id))
            .map(|(_, at)| at)
            .min();
        Ok(stats::compute(&jobs, &executions, next))
    }

    pub async fn health(&self, job_id: Option<Uuid>) -> Result<HealthReport, BackupError> {
        let names: HashMap<Uuid, String> = self
            .jobs
            .list()
            .await?
            .into_iter()
            .map(|job| (job.id, job.name))
            .collect();
        let upcoming = self
            .scheduler
            .upcoming(usize::MAX)
            .into_iter()
            .filter(|(id, _)| job_id.is_none_or(|wanted| wanted == *id))
            .take(UPCOMING_LIMIT)
            .map(|(id, scheduled_at)| UpcomingBackup {
                job_id: id,
                job_name: names.get(&id).cloned().unwrap_or_default(),
                scheduled_at,
            })
            .collect();
        self.health.check(job_id, upcoming).await
    }
}

#[async_trait]
impl ScheduledBackupRunner for BackupOrchestrator {
    async fn run_scheduled_backup(&self, job_id: Uuid) -> Result<(), BackupError> {
        self.execute_with_trigger(job_id, ExecutionTrigger::Scheduled)
            .await
            .map(|_| ())
    }
}

fn normalized(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Directory for `location` below `root`. Only plain relative paths are
/// accepted.
fn storage_dir(root: &Path, location: &str) -> Result<PathBuf, BackupError> {
    let location = location.trim();
    let relative = Path::new(location);
    let plain = !location.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !plain {
        return Err(BackupError::invalid(format!(
            "storage location '{location}' must be a relative path below the storage root"
        )));
    }
    Ok(root.join(relative))
}

/// Lowercase name with runs of other characters collapsed to `-`.
fn slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "job".to_string()
    } else {
        slug.to_string()
    }
}

/// `<root>/<location>/<slug>/<slug>_<kind>_<timestamp>_<id prefix>.<ext>`
fn output_path(
    root: &Path,
    job: &backup_job::Model,
    extension: &str,
    execution_id: Uuid,
    at: DateTime<Utc>,
) -> PathBuf {
    let slug = slug(&job.name);
    let id = execution_id.simple().to_string();
    let file_name = format!(
        "{slug}_{}_{}_{}.{extension}",
        job.kind.to_ascii_lowercase(),
        at.format("%Y%m%dT%H%M%S%3fZ"),
        &id[..8],
    );
    root.join(job.storage_location.trim())
        .join(&slug)
        .join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn slugs_are_filesystem_safe() {
        assert_eq!(slug("Nightly PG / main"), "nightly-pg-main");
        assert_eq!(slug("***"), "job");
        assert_eq!(slug("orders_db"), "orders-db");
    }

    #[test]
    fn output_path_is_deterministic() {
        let now = Utc::now().fixed_offset();
        let job = backup_job::Model {
            id: Uuid::new_v4(),
            name: "Nightly PG".into(),
            kind: "FULL".into(),
            data_source: "database:postgresql://db/app".into(),
            schedule: None,
            timezone: None,
            retention_days: 30,
            compression: true,
            encryption: false,
            storage_location: "primary".into(),
            options: None,
            active: true,
            success_count: 0,
            failure_count: 0,
            total_bytes: 0,
            last_backup: None,
            next_backup: None,
            created_at: now,
            updated_at: now,
        };
        let execution_id = Uuid::parse_str("1b4e28ba-2fa1-11d2-883f-0016d3cca427").unwrap();
        let at = Utc.with_ymd_and_hms(2026, 1, 10, 2, 0, 0).unwrap()
            + chrono::Duration::milliseconds(42);

        let path = output_path(Path::new("/var/backups"), &job, "dump", execution_id, at);
        assert_eq!(
            path,
            PathBuf::from(
                "/var/backups/primary/nightly-pg/nightly-pg_full_20260110T020000042Z_1b4e28ba.dump"
            )
        );
    }

    #[test]
    fn storage_locations_must_stay_below_root() {
        let root = Path::new("/var/backups");
        assert_eq!(
            storage_dir(root, "primary/pg").unwrap(),
            PathBuf::from("/var/backups/primary/pg")
        );
        assert!(storage_dir(root, "../etc").is_err());
        assert!(storage_dir(root, "/etc").is_err());
        assert!(storage_dir(root, "  ").is_err());
    }
}
