//! # Execution Handlers
//!
//! Listing, verification, cancellation, restore and deletion of backup
//! executions.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::orchestrator::{ExecutionView, RestoreOutcome, RestoreRecordView, RestoreRequest};
use crate::server::AppState;

/// Optional job filter shared by listing endpoints
#[derive(Debug, Default, Deserialize)]
pub struct JobFilter {
    pub job_id: Option<Uuid>,
}

/// List executions, newest first
#[utoipa::path(
    get,
    path = "/executions",
    params(("job_id" = Option<Uuid>, Query, description = "Only executions of this job")),
    responses(
        (status = 200, description = "Executions", body = [ExecutionView]),
        (status = 404, description = "Unknown job", body = ApiError)
    ),
    tag = "executions"
)]
pub async fn list_executions(
    State(state): State<AppState>,
    Query(filter): Query<JobFilter>,
) -> Result<Json<Vec<ExecutionView>>, ApiError> {
    let executions = state.orchestrator.list_executions(filter.job_id).await?;
    Ok(Json(executions.into_iter().map(ExecutionView::from).collect()))
}

#[utoipa::path(
    get,
    path = "/executions/{id}",
    params(("id" = Uuid, Path, description = "Execution id")),
    responses(
        (status = 200, description = "Execution", body = ExecutionView),
        (status = 404, description = "Unknown execution", body = ApiError)
    ),
    tag = "executions"
)]
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExecutionView>, ApiError> {
    let execution = state.orchestrator.get_execution(id).await?;
    Ok(Json(execution.into()))
}

/// Delete an execution and its artifact
#[utoipa::path(
    delete,
    path = "/executions/{id}",
    params(("id" = Uuid, Path, description = "Execution id")),
    responses(
        (status = 204, description = "Execution deleted"),
        (status = 400, description = "Execution is still in progress", body = ApiError),
        (status = 404, description = "Unknown execution", body = ApiError),
        (status = 500, description = "Artifact could not be removed", body = ApiError)
    ),
    tag = "executions"
)]
pub async fn delete_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.delete_execution(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Restore a successful backup
#[utoipa::path(
    post,
    path = "/executions/{id}/restore",
    params(("id" = Uuid, Path, description = "Execution id")),
    request_body = RestoreRequest,
    responses(
        (status = 200, description = "Restore finished or dry run recorded", body = RestoreOutcome),
        (status = 400, description = "Execution not restorable or checksum mismatch", body = ApiError),
        (status = 404, description = "Unknown execution or missing artifact", body = ApiError),
        (status = 500, description = "Restore program failed", body = ApiError)
    ),
    tag = "executions"
)]
pub async fn restore_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<RestoreRequest>, JsonRejection>,
) -> Result<Json<RestoreOutcome>, ApiError> {
    let Json(request) = payload?;
    let outcome = state.orchestrator.restore_from_backup(id, request).await?;
    Ok(Json(outcome))
}

/// Recompute the artifact checksum
#[utoipa::path(
    post,
    path = "/executions/{id}/verify",
    params(("id" = Uuid, Path, description = "Execution id")),
    responses(
        (status = 200, description = "Execution marked VERIFIED or CORRUPTED", body = ExecutionView),
        (status = 400, description = "Execution has no verifiable artifact", body = ApiError),
        (status = 404, description = "Unknown execution", body = ApiError)
    ),
    tag = "executions"
)]
pub async fn verify_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExecutionView>, ApiError> {
    let execution = state.orchestrator.verify_execution(id).await?;
    Ok(Json(execution.into()))
}

/// Cancel an execution that has not started
#[utoipa::path(
    post,
    path = "/executions/{id}/cancel",
    params(("id" = Uuid, Path, description = "Execution id")),
    responses(
        (status = 200, description = "Execution cancelled", body = ExecutionView),
        (status = 400, description = "Execution is not PENDING", body = ApiError),
        (status = 404, description = "Unknown execution", body = ApiError)
    ),
    tag = "executions"
)]
pub async fn cancel_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExecutionView>, ApiError> {
    let execution = state.orchestrator.cancel_execution(id).await?;
    Ok(Json(execution.into()))
}

/// Restore attempts recorded for an execution
#[utoipa::path(
    get,
    path = "/executions/{id}/restores",
    params(("id" = Uuid, Path, description = "Execution id")),
    responses(
        (status = 200, description = "Restore history, newest first", body = [RestoreRecordView]),
        (status = 404, description = "Unknown execution", body = ApiError)
    ),
    tag = "executions"
)]
pub async fn list_restores(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RestoreRecordView>>, ApiError> {
    let records = state.orchestrator.list_restores(id).await?;
    Ok(Json(records.into_iter().map(RestoreRecordView::from).collect()))
}
