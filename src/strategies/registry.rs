//! Strategy registry
//!
//! Maps each data-source family to the strategy that backs it up. The
//! registry is built once at startup and handed to the orchestrator; tests
//! register their own strategies.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::command::CommandStrategy;
use super::family::{DataSource, DataSourceFamily, UnsupportedDataSource};
use super::mongodb::MongoCommands;
use super::mysql::MysqlCommands;
use super::postgres::PostgresCommands;
use super::sqlite::SqliteCommands;
use super::trait_::BackupStrategy;
use crate::config::AppConfig;

/// Error type for registry lookups
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedDataSource),
    #[error("no backup strategy registered for {family} data sources")]
    StrategyNotRegistered { family: DataSourceFamily },
}

#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<DataSourceFamily, Arc<dyn BackupStrategy>>,
}

impl StrategyRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the command-line strategy of every supported family,
    /// using the configured tool paths and timeout.
    pub fn from_config(config: &AppConfig) -> Self {
        let timeout = Duration::from_secs(config.storage.command_timeout_seconds);
        let tools = &config.tools;

        let mut registry = Self::new();
        registry.register(Arc::new(CommandStrategy::new(
            PostgresCommands::new(tools.pg_dump.clone(), tools.pg_restore.clone()),
            timeout,
        )));
        registry.register(Arc::new(CommandStrategy::new(
            MysqlCommands::new(tools.mysqldump.clone(), tools.mysql.clone()),
            timeout,
        )));
        registry.register(Arc::new(CommandStrategy::new(
            MongoCommands::new(tools.mongodump.clone(), tools.mongorestore.clone()),
            timeout,
        )));
        registry.register(Arc::new(CommandStrategy::new(
            SqliteCommands::new(tools.sqlite3.clone()),
            timeout,
        )));
        registry
    }

    /// Register a strategy, replacing any previous one for the same family.
    pub fn register(&mut self, strategy: Arc<dyn BackupStrategy>) {
        let family = strategy.family();
        debug!(%family, "Registering backup strategy");
        self.strategies.insert(family, strategy);
    }

    pub fn get(&self, family: DataSourceFamily) -> Result<Arc<dyn BackupStrategy>, RegistryError> {
        self.strategies
            .get(&family)
            .cloned()
            .ok_or(RegistryError::StrategyNotRegistered { family })
    }

    /// Pick the strategy for a data-source descriptor.
    pub fn resolve(&self, descriptor: &str) -> Result<Arc<dyn BackupStrategy>, RegistryError> {
        let source = DataSource::parse(descriptor)?;
        self.get(source.family)
    }

    /// Registered families, sorted for stable output.
    pub fn families(&self) -> Vec<DataSourceFamily> {
        let mut families: Vec<_> = self.strategies.keys().copied().collect();
        families.sort_by_key(|f| f.as_str());
        families
    }
}
