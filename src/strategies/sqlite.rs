//! SQLite backups through the `sqlite3` shell's online `.backup`/`.restore`.

use std::path::Path;

use super::command::DumpCommands;
use super::family::{DataSource, DataSourceFamily};
use super::process::CommandSpec;
use super::trait_::{BackupOptions, RestoreOptions, StrategyError};

pub struct SqliteCommands {
    sqlite3: String,
}

impl SqliteCommands {
    pub fn new<S: Into<String>>(sqlite3: S) -> Self {
        Self {
            sqlite3: sqlite3.into(),
        }
    }
}

/// Dot-commands take single-quoted arguments without an escape syntax.
fn quoted(path: &Path) -> Result<String, String> {
    let text = path.display().to_string();
    if text.contains('\'') {
        return Err(format!("path {text} contains a single quote"));
    }
    Ok(format!("'{text}'"))
}

impl DumpCommands for SqliteCommands {
    fn family(&self) -> DataSourceFamily {
        DataSourceFamily::Sqlite
    }

    fn extension(&self, _options: &BackupOptions) -> &'static str {
        "sqlite"
    }

    fn backup_command(
        &self,
        source: &DataSource,
        output: &Path,
        _options: &BackupOptions,
    ) -> Result<CommandSpec, String> {
        let database = Path::new(source.sqlite_path());
        // sqlite3 silently creates missing databases
        if !database.is_file() {
            return Err(format!(
                "SQLite database {} does not exist",
                database.display()
            ));
        }

        Ok(CommandSpec::new(self.sqlite3.as_str())
            .arg(database.display().to_string())
            .arg(format!(".backup {}", quoted(output)?)))
    }

    fn restore_command(
        &self,
        artifact: &Path,
        target: &DataSource,
        options: &RestoreOptions,
    ) -> Result<CommandSpec, StrategyError> {
        let database = Path::new(target.sqlite_path());
        if database.exists() && !options.overwrite_existing {
            return Err(StrategyError::InvalidTarget(format!(
                "{} already exists; set overwrite_existing to replace it",
                database.display()
            )));
        }

        let artifact = quoted(artifact).map_err(StrategyError::InvalidTarget)?;
        Ok(CommandSpec::new(self.sqlite3.as_str())
            .arg(database.display().to_string())
            .arg(format!(".restore {artifact}")))
    }
}
