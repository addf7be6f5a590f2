//! Backup strategies
//!
//! This module provides the pluggable backup layer:
//! - The `BackupStrategy` trait every family implementation satisfies
//! - Data-source family detection
//! - A command-driven strategy plus the argument builders for PostgreSQL,
//!   MySQL, MongoDB and SQLite
//! - The registry used to resolve a job's data source to its strategy

pub mod command;
pub mod family;
pub mod mongodb;
pub mod mysql;
pub mod postgres;
pub mod process;
pub mod registry;
pub mod sqlite;
pub mod trait_;

pub use command::{CommandStrategy, DumpCommands};
pub use family::{DataSource, DataSourceFamily, FamilyCategory, UnsupportedDataSource};
pub use mongodb::MongoCommands;
pub use mysql::MysqlCommands;
pub use postgres::PostgresCommands;
pub use process::{CommandOutput, CommandSpec, ProcessError, run_command};
pub use registry::{RegistryError, StrategyRegistry};
pub use trait_::{
    BackupOptions, BackupStrategy, RestoreOptions, RestoreResult, StrategyError, StrategyOutcome,
};
