//! # Data Models
//!
//! SeaORM entities for jobs, executions, restore history and retention
//! policies, plus the domain enums persisted as text columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod backup_execution;
pub mod backup_job;
pub mod restore_history;
pub mod retention_policy;

pub use backup_execution::Entity as BackupExecution;
pub use backup_job::Entity as BackupJob;
pub use restore_history::Entity as RestoreHistory;
pub use retention_policy::Entity as RetentionPolicy;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "backup-orchestrator".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Returned by the `FromStr` impls below when a stored value is unrecognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

/// Kind of backup a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupKind {
    Full,
    Incremental,
    Differential,
    TransactionLog,
    Snapshot,
    Continuous,
}

text_enum!(BackupKind, "backup kind", {
    Full => "FULL",
    Incremental => "INCREMENTAL",
    Differential => "DIFFERENTIAL",
    TransactionLog => "TRANSACTION_LOG",
    Snapshot => "SNAPSHOT",
    Continuous => "CONTINUOUS",
});

/// Lifecycle state of a backup execution.
///
/// ```text
/// PENDING -> RUNNING -> COMPLETED -> VERIFIED -> CORRUPTED
///    |          |  \        \
///    |          |   FAILED   CORRUPTED
///    +----------+-> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Corrupted,
    Verified,
}

text_enum!(ExecutionStatus, "execution status", {
    Pending => "PENDING",
    Running => "RUNNING",
    Completed => "COMPLETED",
    Failed => "FAILED",
    Cancelled => "CANCELLED",
    Corrupted => "CORRUPTED",
    Verified => "VERIFIED",
});

impl ExecutionStatus {
    /// Whether `self -> next` is a legal lifecycle step.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Completed, Corrupted)
                | (Completed, Verified)
                | (Verified, Corrupted)
        )
    }

    /// A backup artifact exists and was produced successfully.
    pub fn is_successful(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Verified)
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }
}

/// What started an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionTrigger {
    Manual,
    Scheduled,
}

text_enum!(ExecutionTrigger, "execution trigger", {
    Manual => "MANUAL",
    Scheduled => "SCHEDULED",
});

/// Outcome recorded in the restore history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestoreStatus {
    Succeeded,
    Failed,
    DryRun,
}

text_enum!(RestoreStatus, "restore status", {
    Succeeded => "SUCCEEDED",
    Failed => "FAILED",
    DryRun => "DRY_RUN",
});
