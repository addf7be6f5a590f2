//! MySQL / MariaDB backups via `mysqldump` and the `mysql` client.
//!
//! The password never appears on the command line; it is handed over in
//! `MYSQL_PWD`.

use std::path::Path;

use url::Url;

use super::command::DumpCommands;
use super::family::{DataSource, DataSourceFamily};
use super::process::CommandSpec;
use super::trait_::{BackupOptions, RestoreOptions, StrategyError};

pub struct MysqlCommands {
    mysqldump: String,
    mysql: String,
}

/// Connection parameters extracted from a `mysql://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MysqlTarget {
    host: String,
    port: u16,
    user: Option<String>,
    password: Option<String>,
    database: String,
}

impl MysqlTarget {
    fn parse(connection: &str) -> Result<Self, String> {
        let url = Url::parse(connection).map_err(|err| format!("invalid MySQL URL: {err}"))?;
        let database = url.path().trim_start_matches('/').to_string();
        if database.is_empty() {
            return Err("MySQL URL must name a database".to_string());
        }
        Ok(Self {
            host: url.host_str().unwrap_or("localhost").to_string(),
            port: url.port().unwrap_or(3306),
            user: Some(url.username())
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            password: url.password().map(str::to_string),
            database,
        })
    }

    fn apply(&self, mut spec: CommandSpec) -> CommandSpec {
        spec = spec
            .arg(format!("--host={}", self.host))
            .arg(format!("--port={}", self.port));
        if let Some(user) = &self.user {
            spec = spec.arg(format!("--user={user}"));
        }
        if let Some(password) = &self.password {
            spec = spec.env("MYSQL_PWD", password.as_str());
        }
        spec
    }
}

impl MysqlCommands {
    pub fn new<S: Into<String>>(mysqldump: S, mysql: S) -> Self {
        Self {
            mysqldump: mysqldump.into(),
            mysql: mysql.into(),
        }
    }
}

impl DumpCommands for MysqlCommands {
    fn family(&self) -> DataSourceFamily {
        DataSourceFamily::Mysql
    }

    fn extension(&self, _options: &BackupOptions) -> &'static str {
        "sql"
    }

    fn backup_command(
        &self,
        source: &DataSource,
        output: &Path,
        options: &BackupOptions,
    ) -> Result<CommandSpec, String> {
        if !options.include_schemas() && !options.include_data() {
            return Err("backup options exclude both schema and data".to_string());
        }
        let target = MysqlTarget::parse(&source.connection)?;

        let mut spec = target
            .apply(CommandSpec::new(self.mysqldump.as_str()))
            .arg("--single-transaction")
            .arg("--routines")
            .arg("--triggers")
            .arg(format!("--result-file={}", output.display()));

        if options.compression() {
            spec = spec.arg("--compress");
        }
        if !options.include_data() {
            spec = spec.arg("--no-data");
        }
        if !options.include_schemas() {
            spec = spec.arg("--no-create-info");
        }
        spec = spec.args(
            options
                .exclude_tables
                .iter()
                .map(|t| format!("--ignore-table={}.{t}", target.database)),
        );

        Ok(spec
            .arg(target.database.as_str())
            .args(options.include_tables.iter().cloned()))
    }

    fn restore_command(
        &self,
        artifact: &Path,
        target: &DataSource,
        options: &RestoreOptions,
    ) -> Result<CommandSpec, StrategyError> {
        let target = MysqlTarget::parse(&target.connection).map_err(StrategyError::InvalidTarget)?;

        let mut spec = target.apply(CommandSpec::new(self.mysql.as_str()));
        if options.skip_errors {
            spec = spec.arg("--force");
        }

        Ok(spec
            .arg(target.database.as_str())
            .stdin_file(artifact.to_path_buf()))
    }
}
