//! # Backup Orchestrator Entry Point

use std::sync::Arc;

use anyhow::Context;
use backup_orchestrator::{
    config::ConfigLoader,
    db,
    orchestrator::BackupOrchestrator,
    retention::CleanupRequest,
    scheduler::BackupScheduler,
    server::{AppState, run_server},
    strategies::StrategyRegistry,
    telemetry,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Schedule, run, verify and restore database backups
#[derive(Parser, Debug)]
#[clap(rename_all = "kebab-case")]
#[clap(name = env!("CARGO_BIN_NAME"), version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
#[clap(rename_all = "kebab-case")]
enum Command {
    /// Serve the HTTP API and run scheduled backups (default).
    Serve,
    /// Run one backup of a job and exit.
    RunJob {
        /// Id of the job to back up.
        job_id: Uuid,
    },
    /// Delete executions past their retention window.
    Cleanup {
        #[clap(long)]
        job_id: Option<Uuid>,
        /// Override every job's retention window.
        #[clap(long)]
        retention_days: Option<u32>,
        /// Report what would be deleted without deleting.
        #[clap(long)]
        dry_run: bool,
    },
    /// Apply database migrations and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::new().load().context("loading configuration")?;
    telemetry::init_tracing(&config)?;
    tracing::info!(profile = %config.profile, "Configuration loaded");
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(config = %redacted, "Effective configuration");
    }

    let db = db::init_pool(&config).await?;
    db::migrate(&db).await?;
    if matches!(args.command, Some(Command::Migrate)) {
        return Ok(());
    }

    let config = Arc::new(config);
    let shutdown = CancellationToken::new();
    let scheduler = Arc::new(BackupScheduler::new(shutdown.child_token()));
    let orchestrator = BackupOrchestrator::new(
        db.clone(),
        Arc::clone(&config),
        StrategyRegistry::from_config(&config),
        scheduler,
    );

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            orchestrator.initialize().await?;

            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutdown requested");
                }
                signal_token.cancel();
            });

            let state = AppState {
                config,
                db,
                orchestrator: Arc::clone(&orchestrator),
            };
            let result = run_server(state, shutdown.clone()).await;
            shutdown.cancel();
            orchestrator.shutdown();
            result
        }
        Command::RunJob { job_id } => {
            let execution = orchestrator.execute_backup(job_id).await?;
            tracing::info!(
                execution_id = %execution.id,
                file = ?execution.file_path,
                size_bytes = ?execution.size_bytes,
                "Backup finished"
            );
            Ok(())
        }
        Command::Cleanup {
            job_id,
            retention_days,
            dry_run,
        } => {
            let report = orchestrator
                .cleanup(CleanupRequest {
                    retention_days,
                    dry_run: Some(dry_run),
                    job_id,
                    scope: None,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Migrate => Ok(()),
    }
}
