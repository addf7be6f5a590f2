//! # API Handlers
//!
//! HTTP endpoints over the [`BackupOrchestrator`](crate::orchestrator::BackupOrchestrator).
//! Handlers only translate between JSON and orchestrator calls; every
//! failure is a [`BackupError`](crate::error::BackupError) rendered as
//! problem+json through [`ApiError`].

pub mod executions;
pub mod jobs;
pub mod maintenance;

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness payload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Liveness {
    #[schema(example = "ok")]
    pub status: String,
    /// Number of live schedule timers
    pub scheduled_jobs: usize,
}

/// Database liveness probe
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service and database are reachable", body = Liveness),
        (status = 503, description = "Database unavailable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<Liveness>, ApiError> {
    crate::db::health_check(&state.db).await.map_err(|err| {
        tracing::warn!(error = %err, "Database health check failed");
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "database is unreachable",
        )
    })?;

    Ok(Json(Liveness {
        status: "ok".to_string(),
        scheduled_jobs: state.orchestrator.scheduler().scheduled_count(),
    }))
}
