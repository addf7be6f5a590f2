//! Integration tests for database bootstrap and migrations.

mod test_utils;

use backup_orchestrator::{config::AppConfig, db};
use migration::{Migrator, MigratorTrait};
use tempfile::TempDir;

/// Pool bootstrap against a file-backed SQLite database, then migrations and
/// the liveness query.
#[tokio::test]
async fn test_init_pool_migrate_and_health_check() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let mut config = AppConfig::default();
    config.database_url = format!("sqlite://{}?mode=rwc", dir.path().join("state.db").display());
    config.db_max_connections = 2;

    let db = db::init_pool(&config).await?;
    db::migrate(&db).await?;

    let applied = Migrator::get_applied_migrations(&db).await?;
    assert_eq!(applied.len(), 4, "every backup table migration is applied");
    db::health_check(&db).await?;

    // Applying again is a no-op.
    db::migrate(&db).await?;
    assert_eq!(Migrator::get_applied_migrations(&db).await?.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_empty_database_url_is_rejected() {
    let mut config = AppConfig::default();
    config.database_url = String::new();

    let err = db::init_pool(&config).await.unwrap_err();
    assert!(err.to_string().contains("Database URL cannot be empty"));
}

#[tokio::test]
async fn test_in_memory_database_is_usable() -> anyhow::Result<()> {
    let db = test_utils::setup_test_db().await?;
    db::health_check(&db).await?;
    assert!(Migrator::get_pending_migrations(&db).await?.is_empty());
    Ok(())
}
