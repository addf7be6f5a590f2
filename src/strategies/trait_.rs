//! Backup strategy trait and the value types exchanged with it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::family::DataSourceFamily;
use crate::models::ExecutionStatus;

/// Tuning knobs for a single backup run.
///
/// Every field is optional; unset fields fall back to the family defaults
/// exposed through the accessor methods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BackupOptions {
    pub include_schemas: Option<bool>,
    pub include_data: Option<bool>,
    pub include_indexes: Option<bool>,
    pub compression: Option<bool>,
    /// 0-9
    pub compression_level: Option<u8>,
    #[serde(default)]
    pub exclude_tables: Vec<String>,
    #[serde(default)]
    pub include_tables: Vec<String>,
    /// Shell snippets run after a successful dump with `BACKUP_FILE` set.
    #[serde(default)]
    pub custom_scripts: Vec<String>,
    pub parallel_threads: Option<u16>,
}

impl BackupOptions {
    pub fn include_schemas(&self) -> bool {
        self.include_schemas.unwrap_or(true)
    }

    pub fn include_data(&self) -> bool {
        self.include_data.unwrap_or(true)
    }

    pub fn include_indexes(&self) -> bool {
        self.include_indexes.unwrap_or(true)
    }

    pub fn compression(&self) -> bool {
        self.compression.unwrap_or(true)
    }

    pub fn compression_level(&self) -> u8 {
        self.compression_level.unwrap_or(6).min(9)
    }

    pub fn parallel_threads(&self) -> u16 {
        self.parallel_threads.unwrap_or(1).max(1)
    }
}

/// Caller-controlled switches for a restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RestoreOptions {
    /// Drop and recreate existing objects in the target before loading.
    #[serde(default)]
    pub overwrite_existing: bool,
    /// Keep loading past individual statement errors.
    #[serde(default)]
    pub skip_errors: bool,
    pub parallel_threads: Option<u16>,
}

/// Result of one strategy invocation, folded into an execution record.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutcome {
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub file_path: Option<PathBuf>,
    pub size_bytes: i64,
    pub compressed_size_bytes: Option<i64>,
    pub file_count: i32,
    pub checksum: Option<String>,
    pub verified: bool,
    pub error_message: Option<String>,
}

impl StrategyOutcome {
    /// A single-artifact success.
    pub fn completed(
        started_at: DateTime<Utc>,
        file_path: PathBuf,
        size_bytes: i64,
        compressed: bool,
        checksum: String,
    ) -> Self {
        let ended_at = Utc::now();
        Self {
            status: ExecutionStatus::Completed,
            started_at,
            ended_at,
            duration_ms: (ended_at - started_at).num_milliseconds(),
            file_path: Some(file_path),
            size_bytes,
            compressed_size_bytes: compressed.then_some(size_bytes),
            file_count: 1,
            checksum: Some(checksum),
            verified: false,
            error_message: None,
        }
    }

    pub fn failed<S: Into<String>>(started_at: DateTime<Utc>, message: S) -> Self {
        let ended_at = Utc::now();
        Self {
            status: ExecutionStatus::Failed,
            started_at,
            ended_at,
            duration_ms: (ended_at - started_at).num_milliseconds(),
            file_path: None,
            size_bytes: 0,
            compressed_size_bytes: None,
            file_count: 0,
            checksum: None,
            verified: false,
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

/// What a restore run reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RestoreResult {
    pub success: bool,
    pub duration_ms: i64,
    /// Diagnostic lines the restore program printed on stderr.
    pub warnings: Vec<String>,
    pub error_message: Option<String>,
}

/// Failures that prevent a restore from being attempted at all.
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("backup artifact {0} does not exist")]
    ArtifactMissing(PathBuf),
    #[error("invalid restore target: {0}")]
    InvalidTarget(String),
    #[error("{0}")]
    Process(#[from] super::process::ProcessError),
}

/// A backup implementation for one data-source family.
#[async_trait]
pub trait BackupStrategy: Send + Sync {
    fn family(&self) -> DataSourceFamily;

    /// File extension (without dot) of artifacts this strategy writes.
    fn artifact_extension(&self, options: &BackupOptions) -> &'static str;

    /// Produce an artifact at `output_path`.
    ///
    /// Never returns an error: every failure is reported as a FAILED outcome
    /// and no partial artifact is left behind.
    async fn execute(
        &self,
        source: &str,
        output_path: &Path,
        options: &BackupOptions,
    ) -> StrategyOutcome;

    /// Load `artifact` into `target`.
    async fn restore(
        &self,
        artifact: &Path,
        target: &str,
        options: &RestoreOptions,
    ) -> Result<RestoreResult, StrategyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_fall_back_to_family_defaults() {
        let options = BackupOptions::default();
        assert!(options.include_schemas());
        assert!(options.include_data());
        assert!(options.compression());
        assert_eq!(options.compression_level(), 6);
        assert_eq!(options.parallel_threads(), 1);

        let tuned = BackupOptions {
            compression_level: Some(42),
            parallel_threads: Some(0),
            ..BackupOptions::default()
        };
        assert_eq!(tuned.compression_level(), 9);
        assert_eq!(tuned.parallel_threads(), 1);
    }

    #[test]
    fn options_deserialize_from_partial_json() {
        let options: BackupOptions =
            serde_json::from_value(serde_json::json!({ "exclude_tables": ["audit_log"] }))
                .unwrap();
        assert_eq!(options.exclude_tables, vec!["audit_log".to_string()]);
        assert!(options.include_tables.is_empty());
    }

    #[test]
    fn failed_outcome_carries_message_and_no_artifact() {
        let outcome = StrategyOutcome::failed(Utc::now(), "exit status 2");
        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert!(outcome.file_path.is_none());
        assert!(outcome.checksum.is_none());
        assert_eq!(outcome.error_message.as_deref(), Some("exit status 2"));
    }
}
