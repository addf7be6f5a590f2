//! Test utilities for database testing.
//!
//! In-memory SQLite databases with migrations applied, a programmable fake
//! backup strategy and fixture helpers for backdated executions.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use backup_orchestrator::checksum::ChecksumVerifier;
use backup_orchestrator::config::AppConfig;
use backup_orchestrator::models::{ExecutionStatus, backup_execution};
use backup_orchestrator::orchestrator::{BackupOrchestrator, CreateJobRequest};
use backup_orchestrator::scheduler::BackupScheduler;
use backup_orchestrator::strategies::{
    BackupOptions, BackupStrategy, DataSourceFamily, RestoreOptions, RestoreResult,
    StrategyError, StrategyOutcome, StrategyRegistry,
};
use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Sets up an in-memory SQLite database with all migrations applied.
///
/// A single pooled connection keeps every query on the same in-memory
/// database.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await?;

    Migrator::up(&db, None).await?;

    Ok(db)
}

/// Fake strategy for the SQLite family that writes `payload` to the output
/// path, optionally after a delay or failing instead.
pub struct FakeStrategy {
    payload: Vec<u8>,
    delay: Duration,
    fail: AtomicBool,
    executions: AtomicUsize,
    restores: AtomicUsize,
}

impl FakeStrategy {
    pub fn new(payload: &[u8]) -> Arc<Self> {
        Self::with_delay(payload, Duration::ZERO)
    }

    pub fn with_delay(payload: &[u8], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            payload: payload.to_vec(),
            delay,
            fail: AtomicBool::new(false),
            executions: AtomicUsize::new(0),
            restores: AtomicUsize::new(0),
        })
    }

    pub fn fail_next_runs(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackupStrategy for FakeStrategy {
    fn family(&self) -> DataSourceFamily {
        DataSourceFamily::Sqlite
    }

    fn artifact_extension(&self, _options: &BackupOptions) -> &'static str {
        "db"
    }

    async fn execute(
        &self,
        _source: &str,
        output_path: &Path,
        options: &BackupOptions,
    ) -> StrategyOutcome {
        let started = Utc::now();
        self.executions.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return StrategyOutcome::failed(started, "sqlite3 exited with status 1: disk I/O error");
        }

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(output_path, &self.payload).await.unwrap();
        let checksum = ChecksumVerifier::new().digest(output_path).await.unwrap();
        StrategyOutcome::completed(
            started,
            output_path.to_path_buf(),
            self.payload.len() as i64,
            options.compression(),
            checksum,
        )
    }

    async fn restore(
        &self,
        artifact: &Path,
        _target: &str,
        _options: &RestoreOptions,
    ) -> Result<RestoreResult, StrategyError> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        if !artifact.exists() {
            return Err(StrategyError::ArtifactMissing(artifact.to_path_buf()));
        }
        Ok(RestoreResult {
            success: true,
            duration_ms: 1,
            warnings: vec!["index rebuilt".to_string()],
            error_message: None,
        })
    }
}

/// An orchestrator over a fresh database, a temporary storage root and the
/// given fake strategy.
pub struct Harness {
    pub db: DatabaseConnection,
    pub orchestrator: Arc<BackupOrchestrator>,
    pub strategy: Arc<FakeStrategy>,
    pub storage: TempDir,
    pub shutdown: CancellationToken,
}

impl Harness {
    pub async fn new(strategy: Arc<FakeStrategy>) -> Result<Self> {
        Self::with_config(strategy, |_| {}).await
    }

    pub async fn with_config(
        strategy: Arc<FakeStrategy>,
        adjust: impl FnOnce(&mut AppConfig),
    ) -> Result<Self> {
        let db = setup_test_db().await?;
        let storage = TempDir::new()?;

        let mut config = AppConfig::default();
        config.storage.root = storage.path().to_path_buf();
        config.storage.auto_cleanup = false;
        adjust(&mut config);

        let mut registry = StrategyRegistry::new();
        registry.register(strategy.clone());

        let shutdown = CancellationToken::new();
        let scheduler = Arc::new(BackupScheduler::new(shutdown.child_token()));
        let orchestrator =
            BackupOrchestrator::new(db.clone(), Arc::new(config), registry, scheduler);

        Ok(Self {
            db,
            orchestrator,
            strategy,
            storage,
            shutdown,
        })
    }

    pub fn storage_root(&self) -> PathBuf {
        self.storage.path().to_path_buf()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A valid SQLite job definition without a schedule.
pub fn job_request(name: &str) -> CreateJobRequest {
    CreateJobRequest {
        name: name.to_string(),
        kind: backup_orchestrator::models::BackupKind::Full,
        data_source: "database:sqlite:///srv/data/app.db".to_string(),
        schedule: None,
        timezone: None,
        retention_days: None,
        compression: true,
        encryption: false,
        storage_location: "primary".to_string(),
        options: None,
        active: true,
    }
}

/// Insert an execution row directly, bypassing the lifecycle, with the
/// given reference time and an optional artifact.
pub async fn insert_execution(
    db: &DatabaseConnection,
    job_id: Uuid,
    status: ExecutionStatus,
    at: DateTime<Utc>,
    artifact: Option<(&Path, i64)>,
) -> Result<backup_execution::Model> {
    let at = at.fixed_offset();
    let model = backup_execution::ActiveModel {
        id: Set(Uuid::new_v4()),
        job_id: Set(job_id),
        status: Set(status.as_str().to_string()),
        triggered_by: Set("SCHEDULED".to_string()),
        started_at: Set(Some(at)),
        ended_at: Set((!status.is_in_progress()).then_some(at)),
        duration_ms: Set(Some(1_000)),
        file_path: Set(artifact.map(|(path, _)| path.display().to_string())),
        size_bytes: Set(artifact.map(|(_, size)| size)),
        compressed_size_bytes: Set(None),
        file_count: Set(artifact.map(|_| 1)),
        checksum: Set(None),
        verified: Set(status == ExecutionStatus::Verified),
        error_message: Set(None),
        retry_count: Set(0),
        created_at: Set(at),
        updated_at: Set(at),
    };
    Ok(model.insert(db).await?)
}

/// Write an artifact of `size` bytes below `dir`.
pub async fn write_artifact(dir: &Path, name: &str, size: usize) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    tokio::fs::write(&path, vec![b'x'; size]).await?;
    Ok(path)
}
