//! # Backup Scheduler
//!
//! Keeps one timer task per active, schedule-bearing job. Each timer sleeps
//! until the next cron occurrence in the job's timezone and then asks the
//! [`ScheduledBackupRunner`] to run the job. A failing run is logged and
//! counted; the timer keeps firing.
//!
//! The registry is an injected value, not a process global. It is rebuilt
//! from persisted jobs at startup.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::BackupError;
use crate::models::backup_job;
use crate::telemetry::{TraceContext, with_trace_context};

/// Callback invoked when a timer fires.
#[async_trait]
pub trait ScheduledBackupRunner: Send + Sync {
    async fn run_scheduled_backup(&self, job_id: Uuid) -> Result<(), BackupError>;
}

/// A parsed cron expression bound to a fixed UTC offset.
#[derive(Debug, Clone)]
pub struct JobSchedule {
    expression: String,
    schedule: cron::Schedule,
    offset: FixedOffset,
}

impl JobSchedule {
    /// Parse a 5-field (minute precision) or 6/7-field cron expression.
    /// Numeric days of the week use standard cron numbering: 0 and 7 are
    /// Sunday, 1-6 are Monday to Saturday.
    /// `timezone` is `UTC`/`Z` or a fixed offset like `+02:00`.
    pub fn parse(expression: &str, timezone: Option<&str>) -> Result<Self, BackupError> {
        let trimmed = expression.trim();
        let mut fields: Vec<String> = trimmed.split_whitespace().map(str::to_string).collect();
        match fields.len() {
            5 => fields.insert(0, "0".to_string()),
            6 | 7 => {}
            n => {
                return Err(BackupError::invalid(format!(
                    "cron expression '{trimmed}' has {n} fields; expected 5, 6 or 7"
                )));
            }
        }
        fields[DAY_OF_WEEK_FIELD] =
            day_of_week_field(&fields[DAY_OF_WEEK_FIELD]).map_err(|err| {
                BackupError::invalid(format!("invalid cron expression '{trimmed}': {err}"))
            })?;
        let normalized = fields.join(" ");

        let schedule = cron::Schedule::from_str(&normalized).map_err(|err| {
            BackupError::invalid(format!("invalid cron expression '{trimmed}': {err}"))
        })?;
        let offset = parse_timezone(timezone)?;

        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
            offset,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First occurrence strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&self.offset))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Position of the day-of-week field once seconds are present.
const DAY_OF_WEEK_FIELD: usize = 5;

/// Rewrite numeric day-of-week items from standard cron numbering (0-7,
/// Sunday = 0 or 7) to the `cron` crate's 1-7 with Sunday = 1. Items using
/// day names pass through unchanged.
fn day_of_week_field(field: &str) -> Result<String, String> {
    let mut days = BTreeSet::new();
    let mut named = Vec::new();

    for item in field.split(',') {
        if matches!(item, "*" | "?") {
            return Ok(item.to_string());
        }
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, Some(step)),
            None => (item, None),
        };
        let numeric = |raw: &str| raw.parse::<u8>().ok();
        let bounds = if base == "*" {
            Some((0, 6))
        } else if let Some((start, end)) = base.split_once('-') {
            numeric(start).zip(numeric(end))
        } else {
            numeric(base).map(|start| (start, if step.is_some() { 6 } else { start }))
        };
        let Some((start, end)) = bounds else {
            named.push(item.to_string());
            continue;
        };

        if start > 7 || end > 7 || start > end {
            return Err(format!("day-of-week '{item}' is outside 0-7"));
        }
        let step = match step {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| format!("invalid day-of-week step in '{item}'"))?,
            None => 1,
        };
        days.extend((start..=end).step_by(step).map(|day| day % 7 + 1));
    }

    Ok(days
        .iter()
        .map(u8::to_string)
        .chain(named)
        .collect::<Vec<_>>()
        .join(","))
}

fn parse_timezone(timezone: Option<&str>) -> Result<FixedOffset, BackupError> {
    let utc = FixedOffset::east_opt(0).ok_or_else(|| BackupError::invalid("invalid UTC offset"))?;
    let Some(raw) = timezone.map(str::trim).filter(|tz| !tz.is_empty()) else {
        return Ok(utc);
    };
    if matches!(raw.to_ascii_uppercase().as_str(), "UTC" | "Z" | "GMT" | "ETC/UTC") {
        return Ok(utc);
    }

    let unsupported = || {
        BackupError::invalid(format!(
            "unsupported timezone '{raw}'; use UTC or a fixed offset such as +02:00"
        ))
    };
    let offset = raw
        .strip_prefix("UTC")
        .or_else(|| raw.strip_prefix("GMT"))
        .unwrap_or(raw);
    let (sign, digits) = match offset.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(unsupported()),
    };
    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    let hours: i32 = hours.parse().map_err(|_| unsupported())?;
    let minutes: i32 = minutes.parse().map_err(|_| unsupported())?;
    if hours > 14 || minutes > 59 {
        return Err(unsupported());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(unsupported)
}

struct ScheduledTimer {
    schedule: JobSchedule,
    timezone: Option<String>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTimer {
    fn stop(self) {
        self.cancel.cancel();
        // Runs already in flight finish on their own task.
        drop(self.handle);
    }
}

/// Registry of live job timers.
pub struct BackupScheduler {
    timers: Mutex<HashMap<Uuid, ScheduledTimer>>,
    runner: Mutex<Option<Weak<dyn ScheduledBackupRunner>>>,
    shutdown: CancellationToken,
}

impl BackupScheduler {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            timers: Mutex::new(HashMap::new()),
            runner: Mutex::new(None),
            shutdown,
        }
    }

    /// Set the callback timers invoke. Timers hold it weakly, so dropping
    /// the runner quietly stops them.
    pub fn attach_runner(&self, runner: Weak<dyn ScheduledBackupRunner>) {
        *self.runner.lock().unwrap_or_else(PoisonError::into_inner) = Some(runner);
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<Uuid, ScheduledTimer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a timer for `job`.
    ///
    /// A no-op returning `Ok(false)` for inactive or schedule-less jobs and
    /// for jobs already registered with the same schedule. A registered job
    /// whose schedule changed gets its timer replaced.
    #[instrument(skip_all, fields(job_id = %job.id))]
    pub fn schedule_job(&self, job: &backup_job::Model) -> Result<bool, BackupError> {
        let Some(expression) = job.schedule.as_deref().filter(|_| job.is_schedulable()) else {
            return Ok(false);
        };
        let schedule = JobSchedule::parse(expression, job.timezone.as_deref())?;

        let runner = self
            .runner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| BackupError::invalid("scheduler has no backup runner attached"))?;

        let mut timers = self.timers();
        if let Some(existing) = timers.get(&job.id) {
            if existing.schedule.expression() == schedule.expression()
                && existing.timezone == job.timezone
            {
                return Ok(false);
            }
            if let Some(previous) = timers.remove(&job.id) {
                previous.stop();
            }
        }

        let cancel = self.shutdown.child_token();
        let handle = tokio::spawn(run_timer(
            job.id,
            schedule.clone(),
            runner,
            cancel.clone(),
        ));
        timers.insert(
            job.id,
            ScheduledTimer {
                schedule,
                timezone: job.timezone.clone(),
                cancel,
                handle,
            },
        );
        gauge!("backup_scheduler_timers").set(timers.len() as f64);

        info!(job_name = %job.name, schedule = %expression, "Backup job scheduled");
        Ok(true)
    }

    /// Cancel and forget the job's timer. Safe when none exists.
    pub fn unschedule_job(&self, job_id: Uuid) -> bool {
        let mut timers = self.timers();
        let removed = timers.remove(&job_id);
        gauge!("backup_scheduler_timers").set(timers.len() as f64);
        drop(timers);

        match removed {
            Some(timer) => {
                timer.stop();
                info!(job_id = %job_id, "Backup job unscheduled");
                true
            }
            None => false,
        }
    }

    /// Replace every timer with timers for `jobs`. Jobs whose schedule fails
    /// to parse are logged and skipped. Returns the number of live timers.
    pub fn rebuild(&self, jobs: &[backup_job::Model]) -> usize {
        let previous: Vec<ScheduledTimer> = self.timers().drain().map(|(_, t)| t).collect();
        for timer in previous {
            timer.stop();
        }

        for job in jobs {
            if let Err(err) = self.schedule_job(job) {
                warn!(job_id = %job.id, job_name = %job.name, error = %err, "Skipping job with invalid schedule");
            }
        }

        let count = self.scheduled_count();
        info!(timers = count, "Scheduler registry rebuilt");
        count
    }

    pub fn is_scheduled(&self, job_id: Uuid) -> bool {
        self.timers().contains_key(&job_id)
    }

    pub fn scheduled_count(&self) -> usize {
        self.timers().len()
    }

    pub fn next_run(&self, job_id: Uuid) -> Option<DateTime<Utc>> {
        self.timers()
            .get(&job_id)
            .and_then(|timer| timer.schedule.next_after(Utc::now()))
    }

    /// The next `limit` occurrences across all timers, soonest first.
    pub fn upcoming(&self, limit: usize) -> Vec<(Uuid, DateTime<Utc>)> {
        let now = Utc::now();
        let mut upcoming: Vec<_> = self
            .timers()
            .iter()
            .filter_map(|(id, timer)| timer.schedule.next_after(now).map(|at| (*id, at)))
            .collect();
        upcoming.sort_by_key(|(_, at)| *at);
        upcoming.truncate(limit);
        upcoming
    }

    /// Stop every timer.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let stopped: Vec<ScheduledTimer> = self.timers().drain().map(|(_, t)| t).collect();
        let count = stopped.len();
        for timer in stopped {
            timer.stop();
        }
        gauge!("backup_scheduler_timers").set(0.0);
        info!(timers = count, "Scheduler stopped");
    }
}

impl Drop for BackupScheduler {
    fn drop(&mut self) {
        for (_, timer) in self.timers().drain() {
            timer.stop();
        }
    }
}

async fn run_timer(
    job_id: Uuid,
    schedule: JobSchedule,
    runner: Weak<dyn ScheduledBackupRunner>,
    cancel: CancellationToken,
) {
    let mut cursor = Utc::now();
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(cursor.max(now)) else {
            info!(job_id = %job_id, "Schedule has no further occurrences");
            break;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        debug!(job_id = %job_id, next = %next, "Timer armed");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        cursor = next;

        let Some(runner) = runner.upgrade() else {
            debug!(job_id = %job_id, "Backup runner dropped; stopping timer");
            break;
        };

        counter!("backup_scheduler_fired_total").increment(1);
        let context = TraceContext::generate("sched");
        // A separate task so a panicking run cannot take the timer down.
        let run = tokio::spawn(with_trace_context(context, async move {
            runner.run_scheduled_backup(job_id).await
        }));

        let failure = match run.await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(join_err) => Some(format!("backup task aborted: {join_err}")),
        };
        if let Some(error) = failure {
            counter!("backup_scheduler_failures_total").increment(1);
            error!(job_id = %job_id, error = %error, "Scheduled backup failed");
        }
    }
}
