//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM operations
//! for the backup tables, mapping database failures into [`crate::error::BackupError`].

pub mod execution;
pub mod job;
pub mod restore_history;
pub mod retention_policy;

pub use execution::ExecutionRepository;
pub use job::{JobRepository, NewBackupJob};
pub use restore_history::{RestoreHistoryRepository, RestoreRecord};
pub use retention_policy::RetentionPolicyRepository;
