//! # Backup Job Handlers

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::orchestrator::{
    CreateJobRequest, ExecutionView, JobDeletion, JobView, RescheduleRequest, RetentionPolicyView,
};
use crate::retention::RetentionRules;
use crate::server::AppState;

/// Create a backup job and schedule it when it is active
#[utoipa::path(
    post,
    path = "/jobs",
    request_body = CreateJobRequest,
    responses(
        (status = 201, description = "Job created", body = JobView),
        (status = 400, description = "Invalid job definition", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn create_job(
    State(state): State<AppState>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JobView>), ApiError> {
    let Json(request) = payload?;
    let job = state.orchestrator.create_job(request).await?;
    Ok((StatusCode::CREATED, Json(job.into())))
}

/// List all backup jobs
#[utoipa::path(
    get,
    path = "/jobs",
    responses(
        (status = 200, description = "Jobs ordered by creation time", body = [JobView]),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn list_jobs(State(state): State<AppState>) -> Result<Json<Vec<JobView>>, ApiError> {
    let jobs = state.orchestrator.list_jobs().await?;
    Ok(Json(jobs.into_iter().map(JobView::from).collect()))
}

#[utoipa::path(
    get,
    path = "/jobs/{id}",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job", body = JobView),
        (status = 404, description = "Unknown job", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobView>, ApiError> {
    let job = state.orchestrator.get_job(id).await?;
    Ok(Json(job.into()))
}

/// Delete a job, its executions and their artifacts
#[utoipa::path(
    delete,
    path = "/jobs/{id}",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job deleted", body = JobDeletion),
        (status = 404, description = "Unknown job", body = ApiError),
        (status = 409, description = "A backup of the job is running", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobDeletion>, ApiError> {
    let deletion = state.orchestrator.delete_job(id).await?;
    Ok(Json(deletion))
}

/// Flip a job between active and inactive
#[utoipa::path(
    post,
    path = "/jobs/{id}/toggle",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job with its new active flag", body = JobView),
        (status = 404, description = "Unknown job", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn toggle_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobView>, ApiError> {
    let job = state.orchestrator.toggle_job(id).await?;
    Ok(Json(job.into()))
}

/// Replace a job's cron schedule
#[utoipa::path(
    put,
    path = "/jobs/{id}/schedule",
    params(("id" = Uuid, Path, description = "Job id")),
    request_body = RescheduleRequest,
    responses(
        (status = 200, description = "Rescheduled job", body = JobView),
        (status = 400, description = "Invalid cron expression or timezone", body = ApiError),
        (status = 404, description = "Unknown job", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn reschedule_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<RescheduleRequest>, JsonRejection>,
) -> Result<Json<JobView>, ApiError> {
    let Json(request) = payload?;
    let job = state.orchestrator.reschedule_job(id, request).await?;
    Ok(Json(job.into()))
}

/// Start a manual backup in the background
#[utoipa::path(
    post,
    path = "/jobs/{id}/executions",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 202, description = "Execution accepted", body = ExecutionView),
        (status = 400, description = "Job is inactive or misconfigured", body = ApiError),
        (status = 404, description = "Unknown job", body = ApiError),
        (status = 409, description = "A backup of the job is already running", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn trigger_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ExecutionView>), ApiError> {
    let execution = state.orchestrator.trigger_backup(id).await?;
    Ok((StatusCode::ACCEPTED, Json(execution.into())))
}

/// Set the retention policy of one job
#[utoipa::path(
    put,
    path = "/jobs/{id}/retention-policy",
    params(("id" = Uuid, Path, description = "Job id")),
    request_body = RetentionRules,
    responses(
        (status = 200, description = "Stored policy", body = RetentionPolicyView),
        (status = 400, description = "Policy defines no retention window", body = ApiError),
        (status = 404, description = "Unknown job", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn set_job_retention_policy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<RetentionRules>, JsonRejection>,
) -> Result<Json<RetentionPolicyView>, ApiError> {
    let Json(rules) = payload?;
    let policy = state
        .orchestrator
        .set_retention_policy(Some(id), rules)
        .await?;
    Ok(Json(policy.into()))
}
