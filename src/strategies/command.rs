//! Strategy backed by an external dump/restore program pair.
//!
//! [`CommandStrategy`] owns the lifecycle shared by every family (directory
//! creation, timeout, post-hooks, checksum, partial-file cleanup) and asks a
//! [`DumpCommands`] implementation only for the argument lists.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::family::{DataSource, DataSourceFamily};
use super::process::{CommandSpec, run_command};
use super::trait_::{
    BackupOptions, BackupStrategy, RestoreOptions, RestoreResult, StrategyError, StrategyOutcome,
};
use crate::checksum::ChecksumVerifier;

/// Family-specific argument building.
pub trait DumpCommands: Send + Sync {
    fn family(&self) -> DataSourceFamily;

    fn extension(&self, options: &BackupOptions) -> &'static str;

    /// Invocation that writes a backup of `source` to `output`.
    fn backup_command(
        &self,
        source: &DataSource,
        output: &Path,
        options: &BackupOptions,
    ) -> Result<CommandSpec, String>;

    /// Invocation that loads `artifact` into `target`.
    fn restore_command(
        &self,
        artifact: &Path,
        target: &DataSource,
        options: &RestoreOptions,
    ) -> Result<CommandSpec, StrategyError>;
}

pub struct CommandStrategy<C> {
    commands: C,
    timeout: Duration,
    verifier: ChecksumVerifier,
}

impl<C: DumpCommands> CommandStrategy<C> {
    pub fn new(commands: C, timeout: Duration) -> Self {
        Self {
            commands,
            timeout,
            verifier: ChecksumVerifier::new(),
        }
    }

    /// Run the dump and post-hooks; returns the artifact size and digest.
    async fn produce_artifact(
        &self,
        spec: &CommandSpec,
        source: &DataSource,
        output_path: &Path,
        options: &BackupOptions,
    ) -> Result<(i64, String), String> {
        let output = run_command(spec, self.timeout)
            .await
            .map_err(|err| err.to_string())?;
        if !output.success {
            return Err(output.failure_message(&spec.program));
        }
        for line in output.stderr_lines() {
            debug!(program = %spec.program, "{line}");
        }

        ensure_artifact(&spec.program, output_path).await?;

        for script in &options.custom_scripts {
            let hook = CommandSpec::new("sh")
                .arg("-c")
                .arg(script.as_str())
                .env("BACKUP_FILE", output_path.display().to_string())
                .env("BACKUP_SOURCE_FAMILY", source.family.as_str());
            let result = run_command(&hook, self.timeout)
                .await
                .map_err(|err| format!("post-backup script failed: {err}"))?;
            if !result.success {
                return Err(format!(
                    "post-backup script failed: {}",
                    result.failure_message("sh")
                ));
            }
        }

        // Hooks may rewrite the artifact in place, so measure afterwards.
        let size = ensure_artifact(&spec.program, output_path).await?;
        let checksum = self
            .verifier
            .digest(output_path)
            .await
            .map_err(|err| format!("failed to checksum {}: {err}", output_path.display()))?;

        Ok((size, checksum))
    }
}

#[async_trait]
impl<C: DumpCommands> BackupStrategy for CommandStrategy<C> {
    fn family(&self) -> DataSourceFamily {
        self.commands.family()
    }

    fn artifact_extension(&self, options: &BackupOptions) -> &'static str {
        self.commands.extension(options)
    }

    #[instrument(skip(self, source, options), fields(family = %self.commands.family(), output = %output_path.display()))]
    async fn execute(
        &self,
        source: &str,
        output_path: &Path,
        options: &BackupOptions,
    ) -> StrategyOutcome {
        let started_at = Utc::now();

        let source = match DataSource::parse(source) {
            Ok(parsed) if parsed.family == self.commands.family() => parsed,
            Ok(parsed) => {
                return StrategyOutcome::failed(
                    started_at,
                    format!(
                        "{} data source cannot be handled by the {} strategy",
                        parsed.family,
                        self.commands.family()
                    ),
                );
            }
            Err(err) => return StrategyOutcome::failed(started_at, err.to_string()),
        };

        if let Some(parent) = output_path.parent()
            && let Err(err) = tokio::fs::create_dir_all(parent).await
        {
            return StrategyOutcome::failed(
                started_at,
                format!(
                    "failed to create backup directory {}: {err}",
                    parent.display()
                ),
            );
        }

        let spec = match self.commands.backup_command(&source, output_path, options) {
            Ok(spec) => spec,
            Err(message) => return StrategyOutcome::failed(started_at, message),
        };

        match self
            .produce_artifact(&spec, &source, output_path, options)
            .await
        {
            Ok((size, checksum)) => {
                info!(size_bytes = size, "Backup artifact written");
                StrategyOutcome::completed(
                    started_at,
                    output_path.to_path_buf(),
                    size,
                    options.compression(),
                    checksum,
                )
            }
            Err(message) => {
                remove_partial_artifact(output_path).await;
                StrategyOutcome::failed(started_at, message)
            }
        }
    }

    #[instrument(skip(self, target, options), fields(family = %self.commands.family(), artifact = %artifact.display()))]
    async fn restore(
        &self,
        artifact: &Path,
        target: &str,
        options: &RestoreOptions,
    ) -> Result<RestoreResult, StrategyError> {
        if !tokio::fs::try_exists(artifact).await.unwrap_or(false) {
            return Err(StrategyError::ArtifactMissing(artifact.to_path_buf()));
        }

        let target =
            DataSource::parse(target).map_err(|err| StrategyError::InvalidTarget(err.to_string()))?;
        if target.family != self.commands.family() {
            return Err(StrategyError::InvalidTarget(format!(
                "{} target cannot be restored by the {} strategy",
                target.family,
                self.commands.family()
            )));
        }

        let spec = self.commands.restore_command(artifact, &target, options)?;
        let output = run_command(&spec, self.timeout).await?;

        let warnings = output.stderr_lines();
        if !warnings.is_empty() {
            warn!(count = warnings.len(), "Restore program reported diagnostics");
        }

        Ok(RestoreResult {
            success: output.success,
            duration_ms: i64::try_from(output.elapsed.as_millis()).unwrap_or(i64::MAX),
            error_message: (!output.success).then(|| output.failure_message(&spec.program)),
            warnings,
        })
    }
}

async fn ensure_artifact(program: &str, path: &Path) -> Result<i64, String> {
    let metadata = tokio::fs::metadata(path).await.map_err(|err| {
        format!(
            "{program} reported success but no artifact exists at {}: {err}",
            path.display()
        )
    })?;
    if metadata.len() == 0 {
        return Err(format!(
            "{program} produced an empty artifact at {}",
            path.display()
        ));
    }
    Ok(i64::try_from(metadata.len()).unwrap_or(i64::MAX))
}

/// Best-effort removal of an incomplete artifact.
async fn remove_partial_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial backup artifact"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            path = %path.display(),
            error = %err,
            "Failed to remove partial backup artifact"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionStatus;
    use tempfile::TempDir;

    /// Drives `sh -c` scripts so the shared lifecycle can be exercised
    /// without real database tooling.
    struct ScriptCommands {
        backup_script: String,
        restore_script: String,
    }

    impl DumpCommands for ScriptCommands {
        fn family(&self) -> DataSourceFamily {
            DataSourceFamily::Sqlite
        }

        fn extension(&self, _options: &BackupOptions) -> &'static str {
            "bin"
        }

        fn backup_command(
            &self,
            _source: &DataSource,
            output: &Path,
            _options: &BackupOptions,
        ) -> Result<CommandSpec, String> {
            Ok(CommandSpec::new("sh")
                .arg("-c")
                .arg(self.backup_script.as_str())
                .env("OUT", output.display().to_string()))
        }

        fn restore_command(
            &self,
            artifact: &Path,
            _target: &DataSource,
            _options: &RestoreOptions,
        ) -> Result<CommandSpec, StrategyError> {
            Ok(CommandSpec::new("sh")
                .arg("-c")
                .arg(self.restore_script.as_str())
                .env("IN", artifact.display().to_string()))
        }
    }

    fn strategy(backup: &str, restore: &str, timeout: Duration) -> CommandStrategy<ScriptCommands> {
        CommandStrategy::new(
            ScriptCommands {
                backup_script: backup.to_string(),
                restore_script: restore.to_string(),
            },
            timeout,
        )
    }

    #[tokio::test]
    async fn successful_dump_is_checksummed() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("nested/dir/app.bin");
        let strategy = strategy("printf 'hello world' > \"$OUT\"", "true", Duration::from_secs(5));

        let outcome = strategy
            .execute("sqlite:///tmp/app.db", &output, &BackupOptions::default())
            .await;

        assert_eq!(outcome.status, ExecutionStatus::Completed, "{outcome:?}");
        assert_eq!(outcome.size_bytes, 11);
        assert_eq!(outcome.file_count, 1);
        assert_eq!(
            outcome.checksum.as_deref(),
            Some("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
        );
        assert!(output.exists());
    }

    #[tokio::test]
    async fn non_zero_exit_fails_and_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("app.bin");
        let strategy = strategy(
            "printf partial > \"$OUT\"; echo 'disk quota exceeded' >&2; exit 2",
            "true",
            Duration::from_secs(5),
        );

        let outcome = strategy
            .execute("sqlite:///tmp/app.db", &output, &BackupOptions::default())
            .await;

        assert_eq!(outcome.status, ExecutionStatus::Failed);
        let message = outcome.error_message.unwrap();
        assert!(message.contains("exit status 2"), "{message}");
        assert!(message.contains("disk quota exceeded"), "{message}");
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn timeout_is_a_failed_outcome_with_timeout_message() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("app.bin");
        let strategy = strategy(
            "printf partial > \"$OUT\"; sleep 5",
            "true",
            Duration::from_millis(300),
        );

        let outcome = strategy
            .execute("sqlite:///tmp/app.db", &output, &BackupOptions::default())
            .await;

        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert!(outcome.error_message.unwrap().contains("timed out"));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn empty_artifact_counts_as_failure() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("app.bin");
        let strategy = strategy(": > \"$OUT\"", "true", Duration::from_secs(5));

        let outcome = strategy
            .execute("sqlite:///tmp/app.db", &output, &BackupOptions::default())
            .await;

        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert!(outcome.error_message.unwrap().contains("empty artifact"));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn failing_post_script_discards_the_artifact() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("app.bin");
        let strategy = strategy("printf data > \"$OUT\"", "true", Duration::from_secs(5));
        let options = BackupOptions {
            custom_scripts: vec!["test -s \"$BACKUP_FILE\" && exit 7".to_string()],
            ..BackupOptions::default()
        };

        let outcome = strategy
            .execute("sqlite:///tmp/app.db", &output, &options)
            .await;

        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert!(outcome.error_message.unwrap().contains("post-backup script"));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn unsupported_source_fails_without_spawning() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("spawned");
        let strategy = strategy(
            &format!("touch {}", marker.display()),
            "true",
            Duration::from_secs(5),
        );

        let outcome = strategy
            .execute(
                "database:redis://cache",
                &dir.path().join("x.bin"),
                &BackupOptions::default(),
            )
            .await;

        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert!(outcome.error_message.unwrap().contains("unsupported data source"));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn restore_surfaces_stderr_as_warnings() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("app.bin");
        tokio::fs::write(&artifact, b"data").await.unwrap();
        let strategy = strategy(
            "true",
            "echo 'notice: relation already exists' >&2; exit 0",
            Duration::from_secs(5),
        );

        let result = strategy
            .restore(&artifact, "sqlite:///tmp/target.db", &RestoreOptions::default())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.warnings, vec!["notice: relation already exists"]);
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn restore_refuses_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let strategy = strategy("true", "true", Duration::from_secs(5));

        let err = strategy
            .restore(
                &dir.path().join("missing.bin"),
                "sqlite:///tmp/target.db",
                &RestoreOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StrategyError::ArtifactMissing(_)));
    }
}
