//! # Error Handling
//!
//! Domain errors raised by the orchestration engine ([`BackupError`]) and the
//! problem+json envelope ([`ApiError`]) they are rendered into at the HTTP
//! boundary, with trace ID propagation.

use std::path::PathBuf;

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::telemetry;

/// Errors surfaced by the orchestrator, scheduler and retention manager.
///
/// Each variant carries enough context (job name/id, execution id and the
/// underlying message) to diagnose a failure without log correlation.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("a backup of job '{job_name}' ({job_id}) is already in progress")]
    AlreadyRunning { job_id: Uuid, job_name: String },

    #[error(
        "integrity check failed for execution {execution_id}: checksum of {path} does not match recorded value {expected}"
    )]
    IntegrityFailure {
        execution_id: Uuid,
        path: PathBuf,
        expected: String,
    },

    #[error("backup of job '{job_name}' ({job_id}) failed in execution {execution_id}: {message}")]
    ExecutionFailure {
        job_id: Uuid,
        job_name: String,
        execution_id: Uuid,
        message: String,
    },

    #[error("database error while {context}: {source}")]
    Database {
        context: &'static str,
        #[source]
        source: DbErr,
    },

    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BackupError {
    pub fn job_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "backup job",
            id: id.to_string(),
        }
    }

    pub fn execution_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "backup execution",
            id: id.to_string(),
        }
    }

    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Map a database error, logging it with the operation it interrupted.
    pub fn database(context: &'static str, source: DbErr) -> Self {
        tracing::error!(error = %source, context, "Database operation failed");
        Self::Database { context, source }
    }
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Extract current trace ID from the active task (falls back to generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

fn is_unique_violation(error: &DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error.code().is_some_and(|code| {
        let code: &str = code.as_ref();
        code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code)
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<BackupError> for ApiError {
    fn from(error: BackupError) -> Self {
        let message = error.to_string();
        match error {
            BackupError::NotFound { entity, id } => {
                Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message.as_str())
                    .with_details(json!({ "entity": entity, "id": id }))
            }
            BackupError::InvalidRequest(_) => {
                Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message.as_str())
            }
            BackupError::AlreadyRunning { job_id, .. } => {
                Self::new(StatusCode::CONFLICT, "CONFLICT", message.as_str())
                    .with_details(json!({ "job_id": job_id }))
            }
            BackupError::IntegrityFailure { execution_id, .. } => Self::new(
                StatusCode::BAD_REQUEST,
                "INTEGRITY_CHECK_FAILED",
                message.as_str(),
            )
            .with_details(json!({ "execution_id": execution_id })),
            BackupError::ExecutionFailure {
                job_id,
                execution_id,
                ..
            } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "EXECUTION_FAILED",
                message.as_str(),
            )
            .with_details(json!({ "job_id": job_id, "execution_id": execution_id })),
            BackupError::Database { source, .. } => source.into(),
            BackupError::Filesystem { .. } => {
                tracing::error!(error = %message, "Filesystem error");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    message.as_str(),
                )
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<DbErr> for ApiError {
    fn from(error: DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}
