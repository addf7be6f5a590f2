//! PostgreSQL backups via `pg_dump` (custom format) and `pg_restore`.
//!
//! The password is stripped from the connection URL and handed over in
//! `PGPASSWORD`.

use std::path::Path;

use url::Url;

use super::command::DumpCommands;
use super::family::{DataSource, DataSourceFamily};
use super::process::CommandSpec;
use super::trait_::{BackupOptions, RestoreOptions, StrategyError};

pub struct PostgresCommands {
    pg_dump: String,
    pg_restore: String,
}

impl PostgresCommands {
    pub fn new<S: Into<String>>(pg_dump: S, pg_restore: S) -> Self {
        Self {
            pg_dump: pg_dump.into(),
            pg_restore: pg_restore.into(),
        }
    }
}

/// Add `--dbname` without the password and pass the password in the
/// environment.
fn connect(spec: CommandSpec, connection: &str) -> CommandSpec {
    let (dbname, password) = match Url::parse(connection) {
        Ok(mut url) => match url.password().map(str::to_string) {
            Some(password) if url.set_password(None).is_ok() => (url.to_string(), Some(password)),
            _ => (connection.to_string(), None),
        },
        Err(_) => (connection.to_string(), None),
    };
    let spec = spec.arg(format!("--dbname={dbname}"));
    match password {
        Some(password) => spec.env("PGPASSWORD", password),
        None => spec,
    }
}

impl DumpCommands for PostgresCommands {
    fn family(&self) -> DataSourceFamily {
        DataSourceFamily::Postgresql
    }

    fn extension(&self, _options: &BackupOptions) -> &'static str {
        "dump"
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

        let compress = if options.compression() {
            options.compression_level()
        } else {
            0
        };

        let mut spec = connect(CommandSpec::new(self.pg_dump.as_str()), &source.connection)
            .arg("--format=custom")
            .arg(format!("--compress={compress}"))
            .arg(format!("--file={}", output.display()))
            .arg("--no-password");

        // pre-data: definitions, data: rows, post-data: indexes/constraints/triggers
        let all_sections =
            options.include_schemas() && options.include_data() && options.include_indexes();
        if !all_sections {
            if options.include_schemas() {
                spec = spec.arg("--section=pre-data");
            }
            if options.include_data() {
                spec = spec.arg("--section=data");
            }
            if options.include_schemas() && options.include_indexes() {
                spec = spec.arg("--section=post-data");
            }
        }

        spec = spec
            .args(options.include_tables.iter().map(|t| format!("--table={t}")))
            .args(
                options
                    .exclude_tables
                    .iter()
                    .map(|t| format!("--exclude-table={t}")),
            );

        Ok(spec)
    }

    fn restore_command(
        &self,
        artifact: &Path,
        target: &DataSource,
        options: &RestoreOptions,
    ) -> Result<CommandSpec, StrategyError> {
        let mut spec = connect(CommandSpec::new(self.pg_restore.as_str()), &target.connection)
            .arg("--no-owner")
            .arg("--no-password");

        if options.overwrite_existing {
            spec = spec.arg("--clean").arg("--if-exists");
        }
        if !options.skip_errors {
            spec = spec.arg("--exit-on-error");
        }
        if let Some(threads) = options.parallel_threads.filter(|n| *n > 1) {
            spec = spec.arg(format!("--jobs={threads}"));
        }

        Ok(spec.arg(artifact.display().to_string()))
    }
}
