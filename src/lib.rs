//! # Backup Orchestrator Library
//!
//! Scheduled database backups with checksum verification, restore history,
//! retention and health reporting, exposed over an HTTP API.

pub mod checksum;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod health;
pub mod models;
pub mod orchestrator;
pub mod repositories;
pub mod retention;
pub mod scheduler;
pub mod server;
pub mod stats;
pub mod strategies;
pub mod telemetry;
pub use migration;
