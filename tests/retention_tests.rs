//! Retention cleanup over persisted executions and real artifact files.

mod test_utils;

use backup_orchestrator::models::ExecutionStatus;
use backup_orchestrator::retention::{CleanupRequest, RetentionRules};
use chrono::{Duration, Utc};
use test_utils::{FakeStrategy, Harness, insert_execution, job_request, write_artifact};

#[tokio::test]
async fn old_executions_are_deleted_with_their_artifacts() {
    let harness = Harness::new(FakeStrategy::new(b"unused")).await.unwrap();
    let job = harness
        .orchestrator
        .create_job(job_request("retained"))
        .await
        .unwrap();
    let dir = harness.storage_root().join("primary/retained");
    let old_file = write_artifact(&dir, "old.db", 1_024).await.unwrap();
    let recent_file = write_artifact(&dir, "recent.db", 2_048).await.unwrap();

    let now = Utc::now();
    let old = insert_execution(
        &harness.db,
        job.id,
        ExecutionStatus::Completed,
        now - Duration::days(45),
        Some((&old_file, 1_024)),
    )
    .await
    .unwrap();
    let recent = insert_execution(
        &harness.db,
        job.id,
        ExecutionStatus::Completed,
        now - Duration::days(10),
        Some((&recent_file, 2_048)),
    )
    .await
    .unwrap();

    let report = harness
        .orchestrator
        .cleanup(CleanupRequest {
            retention_days: Some(30),
            ..CleanupRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(report.deleted_backups, 1);
    assert_eq!(report.deleted_files, 1);
    assert_eq!(report.freed_space, 1_024);
    assert!(report.errors.is_empty());
    assert!(!report.dry_run);
    assert!(report.cutoff.is_some());

    assert!(!old_file.exists());
    assert!(recent_file.exists());
    assert!(harness.orchestrator.get_execution(old.id).await.is_err());
    assert!(harness.orchestrator.get_execution(recent.id).await.is_ok());
}

#[tokio::test]
async fn dry_run_reports_totals_without_deleting() {
    let harness = Harness::new(FakeStrategy::new(b"unused")).await.unwrap();
    let job = harness
        .orchestrator
        .create_job(job_request("dry"))
        .await
        .unwrap();
    let dir = harness.storage_root().join("primary/dry");
    let file = write_artifact(&dir, "old.db", 512).await.unwrap();
    let old = insert_execution(
        &harness.db,
        job.id,
        ExecutionStatus::Verified,
        Utc::now() - Duration::days(90),
        Some((&file, 512)),
    )
    .await
    .unwrap();

    let report = harness
        .orchestrator
        .cleanup(CleanupRequest {
            retention_days: Some(30),
            dry_run: Some(true),
            ..CleanupRequest::default()
        })
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.deleted_backups, 1);
    assert_eq!(report.freed_space, 512);
    assert!(file.exists());
    assert!(harness.orchestrator.get_execution(old.id).await.is_ok());
}

#[tokio::test]
async fn in_progress_executions_are_never_removed() {
    let harness = Harness::new(FakeStrategy::new(b"unused")).await.unwrap();
    let job = harness
        .orchestrator
        .create_job(job_request("busy"))
        .await
        .unwrap();
    let running = insert_execution(
        &harness.db,
        job.id,
        ExecutionStatus::Running,
        Utc::now() - Duration::days(120),
        None,
    )
    .await
    .unwrap();

    let report = harness
        .orchestrator
        .cleanup(CleanupRequest {
            retention_days: Some(1),
            ..CleanupRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(report.deleted_backups, 0);
    assert!(harness.orchestrator.get_execution(running.id).await.is_ok());
}

#[tokio::test]
async fn missing_artifacts_still_release_the_record() {
    let harness = Harness::new(FakeStrategy::new(b"unused")).await.unwrap();
    let job = harness
        .orchestrator
        .create_job(job_request("vanished"))
        .await
        .unwrap();
    let gone = harness.storage_root().join("primary/vanished/gone.db");
    let old = insert_execution(
        &harness.db,
        job.id,
        ExecutionStatus::Completed,
        Utc::now() - Duration::days(40),
        Some((&gone, 4_096)),
    )
    .await
    .unwrap();

    let report = harness
        .orchestrator
        .cleanup(CleanupRequest {
            retention_days: Some(30),
            ..CleanupRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(report.deleted_backups, 1);
    assert_eq!(report.deleted_files, 0);
    assert_eq!(report.freed_space, 0);
    assert!(harness.orchestrator.get_execution(old.id).await.is_err());
}

#[tokio::test]
async fn stored_policies_apply_per_job_with_global_fallback() {
    let harness = Harness::new(FakeStrategy::new(b"unused")).await.unwrap();
    let strict = harness
        .orchestrator
        .create_job(job_request("strict"))
        .await
        .unwrap();
    let relaxed = harness
        .orchestrator
        .create_job(job_request("relaxed"))
        .await
        .unwrap();

    harness
        .orchestrator
        .set_retention_policy(Some(strict.id), RetentionRules::days(7))
        .await
        .unwrap();
    harness
        .orchestrator
        .set_retention_policy(None, RetentionRules::days(60))
        .await
        .unwrap();

    let twenty_days_ago = Utc::now() - Duration::days(20);
    let strict_old = insert_execution(
        &harness.db,
        strict.id,
        ExecutionStatus::Completed,
        twenty_days_ago,
        None,
    )
    .await
    .unwrap();
    let relaxed_old = insert_execution(
        &harness.db,
        relaxed.id,
        ExecutionStatus::Completed,
        twenty_days_ago,
        None,
    )
    .await
    .unwrap();

    let report = harness
        .orchestrator
        .cleanup(CleanupRequest::default())
        .await
        .unwrap();

    assert_eq!(report.deleted_backups, 1);
    // Two different windows applied, so no single cutoff is reported.
    assert!(report.cutoff.is_none());
    assert!(harness.orchestrator.get_execution(strict_old.id).await.is_err());
    assert!(harness.orchestrator.get_execution(relaxed_old.id).await.is_ok());
}

#[tokio::test]
async fn scope_limits_cleanup_to_one_storage_location() {
    let harness = Harness::new(FakeStrategy::new(b"unused")).await.unwrap();
    let primary = harness
        .orchestrator
        .create_job(job_request("in-primary"))
        .await
        .unwrap();
    let mut request = job_request("in-archive");
    request.storage_location = "archive".to_string();
    let archive = harness.orchestrator.create_job(request).await.unwrap();

    let old = Utc::now() - Duration::days(100);
    let primary_old =
        insert_execution(&harness.db, primary.id, ExecutionStatus::Completed, old, None)
            .await
            .unwrap();
    let archive_old =
        insert_execution(&harness.db, archive.id, ExecutionStatus::Completed, old, None)
            .await
            .unwrap();

    let report = harness
        .orchestrator
        .cleanup(CleanupRequest {
            retention_days: Some(30),
            scope: Some("archive".to_string()),
            ..CleanupRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(report.deleted_backups, 1);
    assert!(harness.orchestrator.get_execution(primary_old.id).await.is_ok());
    assert!(harness.orchestrator.get_execution(archive_old.id).await.is_err());
}

#[tokio::test]
async fn successful_backups_trigger_cleanup_when_enabled() {
    let harness = Harness::with_config(FakeStrategy::new(b"fresh"), |config| {
        config.storage.auto_cleanup = true;
    })
    .await
    .unwrap();
    let mut request = job_request("auto");
    request.retention_days = Some(14);
    let job = harness.orchestrator.create_job(request).await.unwrap();

    let stale = insert_execution(
        &harness.db,
        job.id,
        ExecutionStatus::Completed,
        Utc::now() - Duration::days(30),
        None,
    )
    .await
    .unwrap();

    let fresh = harness.orchestrator.execute_backup(job.id).await.unwrap();

    assert!(harness.orchestrator.get_execution(stale.id).await.is_err());
    assert!(harness.orchestrator.get_execution(fresh.id).await.is_ok());
}

#[tokio::test]
async fn policies_without_a_window_are_rejected() {
    let harness = Harness::new(FakeStrategy::new(b"unused")).await.unwrap();

    let err = harness
        .orchestrator
        .set_retention_policy(None, RetentionRules::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        backup_orchestrator::error::BackupError::InvalidRequest(_)
    ));

    let err = harness
        .orchestrator
        .cleanup(CleanupRequest {
            retention_days: Some(0),
            ..CleanupRequest::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        backup_orchestrator::error::BackupError::InvalidRequest(_)
    ));
}
