//! # Server Configuration
//!
//! Router, shared state and the serve loop of the backup orchestrator API.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::handlers::{self, executions, jobs, maintenance};
use crate::orchestrator::BackupOrchestrator;
use crate::telemetry::{self, TraceContext};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub orchestrator: Arc<BackupOrchestrator>,
}

/// Run every request inside its own trace context so error bodies and log
/// lines share one id.
async fn trace_context(request: Request, next: Next) -> Response {
    let context = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(|value| TraceContext {
            trace_id: value.to_string(),
        })
        .unwrap_or_else(|| TraceContext::generate("req"));
    telemetry::with_trace_context(context, next.run(request)).await
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job).delete(jobs::delete_job))
        .route("/jobs/{id}/toggle", post(jobs::toggle_job))
        .route("/jobs/{id}/schedule", put(jobs::reschedule_job))
        .route("/jobs/{id}/executions", post(jobs::trigger_execution))
        .route(
            "/jobs/{id}/retention-policy",
            put(jobs::set_job_retention_policy),
        )
        .route("/executions", get(executions::list_executions))
        .route(
            "/executions/{id}",
            get(executions::get_execution).delete(executions::delete_execution),
        )
        .route(
            "/executions/{id}/restore",
            post(executions::restore_execution),
        )
        .route("/executions/{id}/verify", post(executions::verify_execution))
        .route("/executions/{id}/cancel", post(executions::cancel_execution))
        .route("/executions/{id}/restores", get(executions::list_restores))
        .route("/statistics", get(maintenance::statistics))
        .route("/health", get(maintenance::health))
        .route("/cleanup", post(maintenance::cleanup))
        .route(
            "/retention-policy",
            put(maintenance::set_global_retention_policy),
        )
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_context))
}

/// Serve the API until `shutdown` is cancelled.
pub async fn run_server(state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = state.config.bind_addr()?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Backup orchestrator API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Backup orchestrator API stopped");
    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::jobs::create_job,
        crate::handlers::jobs::list_jobs,
        crate::handlers::jobs::get_job,
        crate::handlers::jobs::delete_job,
        crate::handlers::jobs::toggle_job,
        crate::handlers::jobs::reschedule_job,
        crate::handlers::jobs::trigger_execution,
        crate::handlers::jobs::set_job_retention_policy,
        crate::handlers::executions::list_executions,
        crate::handlers::executions::get_execution,
        crate::handlers::executions::delete_execution,
        crate::handlers::executions::restore_execution,
        crate::handlers::executions::verify_execution,
        crate::handlers::executions::cancel_execution,
        crate::handlers::executions::list_restores,
        crate::handlers::maintenance::statistics,
        crate::handlers::maintenance::health,
        crate::handlers::maintenance::cleanup,
        crate::handlers::maintenance::set_global_retention_policy,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::BackupKind,
            crate::models::ExecutionStatus,
            crate::models::RestoreStatus,
            crate::handlers::Liveness,
            crate::error::ApiError,
            crate::orchestrator::CreateJobRequest,
            crate::orchestrator::RescheduleRequest,
            crate::orchestrator::RestoreRequest,
            crate::orchestrator::RestoreOutcome,
            crate::orchestrator::JobDeletion,
            crate::orchestrator::JobView,
            crate::orchestrator::ExecutionView,
            crate::orchestrator::RestoreRecordView,
            crate::orchestrator::RetentionPolicyView,
            crate::strategies::BackupOptions,
            crate::retention::RetentionRules,
            crate::retention::CleanupRequest,
            crate::retention::CleanupReport,
            crate::stats::BackupStatistics,
            crate::health::HealthReport,
            crate::health::HealthStatus,
            crate::health::Alert,
            crate::health::AlertType,
            crate::health::AlertSeverity,
            crate::health::StorageCapacity,
            crate::health::UpcomingBackup,
        )
    ),
    tags(
        (name = "root", description = "Service information and liveness"),
        (name = "jobs", description = "Backup job management"),
        (name = "executions", description = "Backup executions and restores"),
        (name = "maintenance", description = "Retention, statistics and health"),
    ),
    info(
        title = "Backup Orchestrator API",
        description = "Scheduled database backups with integrity verification, restore and retention",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
