//! Configuration loading for the backup orchestrator.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `BACKUPS_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "BACKUPS_";

/// Application configuration derived from `BACKUPS_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tools: ToolPaths,
}

/// Where artifacts are written and how they are retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct StorageConfig {
    /// Root directory; per-job output directories are derived beneath it.
    ///
    /// Environment variable: `BACKUPS_STORAGE_ROOT`
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// Capacity used for the storage percentage in health reports.
    ///
    /// Environment variable: `BACKUPS_STORAGE_CAPACITY_BYTES`
    #[serde(default = "default_storage_capacity_bytes")]
    pub capacity_bytes: u64,

    /// Upper bound on a single external backup/restore program run.
    ///
    /// Environment variable: `BACKUPS_COMMAND_TIMEOUT_SECONDS`
    #[serde(default = "default_command_timeout_seconds")]
    pub command_timeout_seconds: u64,

    /// Run retention for the job's scope after every backup.
    ///
    /// Environment variable: `BACKUPS_AUTO_CLEANUP`
    #[serde(default = "default_auto_cleanup")]
    pub auto_cleanup: bool,

    /// Fallback retention when neither the request, the job nor a stored
    /// policy specifies one.
    ///
    /// Environment variable: `BACKUPS_DEFAULT_RETENTION_DAYS`
    #[serde(default = "default_retention_days")]
    pub default_retention_days: u32,
}

/// Paths to the external programs the strategies invoke.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ToolPaths {
    pub pg_dump: String,
    pub pg_restore: String,
    pub mysqldump: String,
    pub mysql: String,
    pub mongodump: String,
    pub mongorestore: String,
    pub sqlite3: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            pg_dump: "pg_dump".to_string(),
            pg_restore: "pg_restore".to_string(),
            mysqldump: "mysqldump".to_string(),
            mysql: "mysql".to_string(),
            mongodump: "mongodump".to_string(),
            mongorestore: "mongorestore".to_string(),
            sqlite3: "sqlite3".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            capacity_bytes: default_storage_capacity_bytes(),
            command_timeout_seconds: default_command_timeout_seconds(),
            auto_cleanup: default_auto_cleanup(),
            default_retention_days: default_retention_days(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::MissingStorageRoot);
        }

        if self.capacity_bytes == 0 {
            return Err(ConfigError::InvalidStorageCapacity);
        }

        if self.command_timeout_seconds < 1 || self.command_timeout_seconds > 86400 {
            return Err(ConfigError::InvalidCommandTimeout {
                value: self.command_timeout_seconds,
            });
        }

        if self.default_retention_days == 0 {
            return Err(ConfigError::InvalidRetentionDays {
                value: self.default_retention_days,
            });
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            storage: StorageConfig::default(),
            tools: ToolPaths::default(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a JSON representation with database credentials redacted.
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        config.database_url = redact_url_credentials(&config.database_url);
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()
            .map_err(|source| ConfigError::InvalidBindAddr {
                value: self.api_bind_addr.clone(),
                source,
            })?;

        if self.database_url.trim().is_empty() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        self.storage.validate()
    }
}

/// Replace the password component of a URL-shaped descriptor, including
/// data-source descriptors carrying a `database:` prefix.
///
/// Strings that do not parse as URLs are returned unchanged.
pub fn redact_url_credentials(raw: &str) -> String {
    if let Some(inner) = raw.strip_prefix(crate::strategies::family::DATABASE_PREFIX) {
        return format!(
            "{}{}",
            crate::strategies::family::DATABASE_PREFIX,
            redact_url_credentials(inner)
        );
    }
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("[REDACTED]")).is_ok() {
                parsed.to_string()
            } else {
                raw.to_string()
            }
        }
        _ => raw.to_string(),
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite://backups.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./backups")
}

fn default_storage_capacity_bytes() -> u64 {
    100 * 1024 * 1024 * 1024 // 100 GiB
}

fn default_command_timeout_seconds() -> u64 {
    3600 // 1 hour
}

fn default_auto_cleanup() -> bool {
    true
}

fn default_retention_days() -> u32 {
    30
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("database URL is missing; set BACKUPS_DATABASE_URL")]
    MissingDatabaseUrl,
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("storage root is missing; set BACKUPS_STORAGE_ROOT")]
    MissingStorageRoot,
    #[error("storage capacity must be greater than zero")]
    InvalidStorageCapacity,
    #[error("command timeout must be between 1 and 86400 seconds, got {value}")]
    InvalidCommandTimeout { value: u64 },
    #[error("default retention must be at least one day, got {value}")]
    InvalidRetentionDays { value: u32 },
}

/// Loads configuration using layered `.env` files and `BACKUPS_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads `.env`, `.env.local`, `.env.<profile>`, `.env.<profile>.local`
    /// and finally the process environment, later layers winning.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr = take_string(&mut layered, "API_BIND_ADDR", default_api_bind_addr);
        let log_level = take_string(&mut layered, "LOG_LEVEL", default_log_level);
        let log_format = take_string(&mut layered, "LOG_FORMAT", default_log_format);
        let database_url = take_string(&mut layered, "DATABASE_URL", default_database_url);
        let db_max_connections = layered
            .remove("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = layered
            .remove("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);

        let storage = StorageConfig {
            root: layered
                .remove("STORAGE_ROOT")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_storage_root),
            capacity_bytes: layered
                .remove("STORAGE_CAPACITY_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_storage_capacity_bytes),
            command_timeout_seconds: layered
                .remove("COMMAND_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_command_timeout_seconds),
            auto_cleanup: layered
                .remove("AUTO_CLEANUP")
                .and_then(|v| parse_bool(&v))
                .unwrap_or_else(default_auto_cleanup),
            default_retention_days: layered
                .remove("DEFAULT_RETENTION_DAYS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_retention_days),
        };

        let defaults = ToolPaths::default();
        let tools = ToolPaths {
            pg_dump: take_string(&mut layered, "PG_DUMP_PATH", || defaults.pg_dump.clone()),
            pg_restore: take_string(&mut layered, "PG_RESTORE_PATH", || {
                defaults.pg_restore.clone()
            }),
            mysqldump: take_string(&mut layered, "MYSQLDUMP_PATH", || {
                defaults.mysqldump.clone()
            }),
            mysql: take_string(&mut layered, "MYSQL_PATH", || defaults.mysql.clone()),
            mongodump: take_string(&mut layered, "MONGODUMP_PATH", || {
                defaults.mongodump.clone()
            }),
            mongorestore: take_string(&mut layered, "MONGORESTORE_PATH", || {
                defaults.mongorestore.clone()
            }),
            sqlite3: take_string(&mut layered, "SQLITE3_PATH", || defaults.sqlite3.clone()),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            storage,
            tools,
        };

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_string(
    layered: &mut BTreeMap<String, String>,
    key: &str,
    default: impl FnOnce() -> String,
) -> String {
    layered
        .remove(key)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(default)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn storage_validation_rejects_zero_timeout() {
        let storage = StorageConfig {
            command_timeout_seconds: 0,
            ..StorageConfig::default()
        };
        assert!(matches!(
            storage.validate(),
            Err(ConfigError::InvalidCommandTimeout { value: 0 })
        ));
    }

    #[test]
    fn rejects_unknown_log_format() {
        let config = AppConfig {
            log_format: "xml".into(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogFormat { .. })
        ));
    }

    #[test]
    fn redacts_database_password() {
        let config = AppConfig {
            database_url: "postgres://backup:s3cret@db:5432/meta".into(),
            ..AppConfig::default()
        };
        let json = config.redacted_json().unwrap();
        assert!(!json.contains("s3cret"));
        assert!(json.contains("REDACTED"));
    }

    #[test]
    fn redacts_prefixed_data_source_descriptors() {
        let redacted = redact_url_credentials("database:mysql://root:hunter2@db/shop");
        assert!(redacted.starts_with("database:mysql://root:"));
        assert!(redacted.contains("REDACTED"));
        assert!(!redacted.contains("hunter2"));
        assert_eq!(redact_url_credentials("/srv/app.db"), "/srv/app.db");
    }

    #[test]
    fn parses_boolean_flags() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
