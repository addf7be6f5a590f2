//! MongoDB backups via `mongodump --archive` and `mongorestore`.

use std::path::Path;

use super::command::DumpCommands;
use super::family::{DataSource, DataSourceFamily};
use super::process::CommandSpec;
use super::trait_::{BackupOptions, RestoreOptions, StrategyError};

pub struct MongoCommands {
    mongodump: String,
    mongorestore: String,
}

impl MongoCommands {
    pub fn new<S: Into<String>>(mongodump: S, mongorestore: S) -> Self {
        Self {
            mongodump: mongodump.into(),
            mongorestore: mongorestore.into(),
        }
    }
}

impl DumpCommands for MongoCommands {
    fn family(&self) -> DataSourceFamily {
        DataSourceFamily::Mongodb
    }

    fn extension(&self, options: &BackupOptions) -> &'static str {
        if options.compression() {
            "archive.gz"
        } else {
            "archive"
        }
    }

    fn backup_command(
        &self,
        source: &DataSource,
        output: &Path,
        options: &BackupOptions,
    ) -> Result<CommandSpec, String> {
        if options.include_tables.len() > 1 {
            return Err("mongodump accepts at most one collection filter".to_string());
        }

        let mut spec = CommandSpec::new(self.mongodump.as_str())
            .arg(format!("--uri={}", source.connection))
            .arg(format!("--archive={}", output.display()));

        if options.compression() {
            spec = spec.arg("--gzip");
        }
        if let Some(collection) = options.include_tables.first() {
            spec = spec.arg(format!("--collection={collection}"));
        }
        spec = spec.args(
            options
                .exclude_tables
                .iter()
                .map(|c| format!("--excludeCollection={c}")),
        );
        if options.parallel_threads() > 1 {
            spec = spec.arg(format!(
                "--numParallelCollections={}",
                options.parallel_threads()
            ));
        }

        Ok(spec)
    }

    fn restore_command(
        &self,
        artifact: &Path,
        target: &DataSource,
        options: &RestoreOptions,
    ) -> Result<CommandSpec, StrategyError> {
        let mut spec = CommandSpec::new(self.mongorestore.as_str())
            .arg(format!("--uri={}", target.connection))
            .arg(format!("--archive={}", artifact.display()));

        if artifact.extension().is_some_and(|ext| ext == "gz") {
            spec = spec.arg("--gzip");
        }
        if options.overwrite_existing {
            spec = spec.arg("--drop");
        }
        if !options.skip_errors {
            spec = spec.arg("--stopOnError");
        }
        if let Some(threads) = options.parallel_threads.filter(|n| *n > 1) {
            spec = spec.arg(format!("--numParallelCollections={threads}"));
        }

        Ok(spec)
    }
}
