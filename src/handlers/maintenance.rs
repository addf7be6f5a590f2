//! # Maintenance and Reporting Handlers

use axum::{
    extract::{Query, State, rejection::JsonRejection},
    response::Json,
};

use super::executions::JobFilter;
use crate::error::ApiError;
use crate::health::HealthReport;
use crate::orchestrator::RetentionPolicyView;
use crate::retention::{CleanupReport, CleanupRequest, RetentionRules};
use crate::server::AppState;
use crate::stats::BackupStatistics;

#[utoipa::path(
    get,
    path = "/statistics",
    params(("job_id" = Option<uuid::Uuid>, Query, description = "Restrict to one job")),
    responses(
        (status = 200, description = "Aggregate statistics", body = BackupStatistics),
        (status = 404, description = "Unknown job", body = ApiError)
    ),
    tag = "maintenance"
)]
pub async fn statistics(
    State(state): State<AppState>,
    Query(filter): Query<JobFilter>,
) -> Result<Json<BackupStatistics>, ApiError> {
    let stats = state.orchestrator.statistics(filter.job_id).await?;
    Ok(Json(stats))
}

#[utoipa::path(
    get,
    path = "/health",
    params(("job_id" = Option<uuid::Uuid>, Query, description = "Restrict to one job")),
    responses(
        (status = 200, description = "Health report with alerts", body = HealthReport),
        (status = 404, description = "Unknown job", body = ApiError)
    ),
    tag = "maintenance"
)]
pub async fn health(
    State(state): State<AppState>,
    Query(filter): Query<JobFilter>,
) -> Result<Json<HealthReport>, ApiError> {
    let report = state.orchestrator.health(filter.job_id).await?;
    Ok(Json(report))
}

/// Delete executions past their retention window
#[utoipa::path(
    post,
    path = "/cleanup",
    request_body = CleanupRequest,
    responses(
        (status = 200, description = "Cleanup report", body = CleanupReport),
        (status = 400, description = "Invalid retention window", body = ApiError),
        (status = 404, description = "Unknown job", body = ApiError)
    ),
    tag = "maintenance"
)]
pub async fn cleanup(
    State(state): State<AppState>,
    payload: Result<Json<CleanupRequest>, JsonRejection>,
) -> Result<Json<CleanupReport>, ApiError> {
    let Json(request) = payload?;
    let report = state.orchestrator.cleanup(request).await?;
    Ok(Json(report))
}

/// Set the policy used by jobs without their own
#[utoipa::path(
    put,
    path = "/retention-policy",
    request_body = RetentionRules,
    responses(
        (status = 200, description = "Stored global policy", body = RetentionPolicyView),
        (status = 400, description = "Policy defines no retention window", body = ApiError)
    ),
    tag = "maintenance"
)]
pub async fn set_global_retention_policy(
    State(state): State<AppState>,
    payload: Result<Json<RetentionRules>, JsonRejection>,
) -> Result<Json<RetentionPolicyView>, ApiError> {
    let Json(rules) = payload?;
    let policy = state.orchestrator.set_retention_policy(None, rules).await?;
    Ok(Json(policy.into()))
}
