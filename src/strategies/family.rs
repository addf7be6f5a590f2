//! Data-source family detection.
//!
//! A descriptor such as `database:postgresql://user@db/app` names both the
//! target system and, by its literal prefix, the family whose strategy can
//! back it up.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::redact_url_credentials;

/// Prefix conventionally put in front of database descriptors.
pub const DATABASE_PREFIX: &str = "database:";

/// Supported data-source families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceFamily {
    Postgresql,
    Mysql,
    Mongodb,
    Sqlite,
}

/// Broad class of a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FamilyCategory {
    Relational,
    Document,
    Embedded,
}

const URL_PREFIXES: &[(&str, DataSourceFamily)] = &[
    ("postgres://", DataSourceFamily::Postgresql),
    ("postgresql://", DataSourceFamily::Postgresql),
    ("mysql://", DataSourceFamily::Mysql),
    ("mariadb://", DataSourceFamily::Mysql),
    ("mongodb://", DataSourceFamily::Mongodb),
    ("mongodb+srv://", DataSourceFamily::Mongodb),
    ("sqlite:", DataSourceFamily::Sqlite),
];

const SQLITE_SUFFIXES: &[&str] = &[".db", ".sqlite", ".sqlite3"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported data source '{descriptor}': no backup strategy matches it")]
pub struct UnsupportedDataSource {
    pub descriptor: String,
}

impl DataSourceFamily {
    /// Detect the family from the descriptor's literal prefix (after an
    /// optional `database:`), or from a SQLite file suffix.
    pub fn detect(descriptor: &str) -> Option<Self> {
        let connection = strip_database_prefix(descriptor);
        let lowered = connection.to_ascii_lowercase();

        URL_PREFIXES
            .iter()
            .find(|(prefix, _)| lowered.starts_with(prefix))
            .map(|(_, family)| *family)
            .or_else(|| {
                SQLITE_SUFFIXES
                    .iter()
                    .any(|suffix| lowered.ends_with(suffix))
                    .then_some(DataSourceFamily::Sqlite)
            })
    }

    pub fn category(&self) -> FamilyCategory {
        match self {
            DataSourceFamily::Postgresql | DataSourceFamily::Mysql => FamilyCategory::Relational,
            DataSourceFamily::Mongodb => FamilyCategory::Document,
            DataSourceFamily::Sqlite => FamilyCategory::Embedded,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSourceFamily::Postgresql => "postgresql",
            DataSourceFamily::Mysql => "mysql",
            DataSourceFamily::Mongodb => "mongodb",
            DataSourceFamily::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for DataSourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A descriptor resolved to its family and bare connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSource {
    pub family: DataSourceFamily,
    pub connection: String,
}

impl DataSource {
    pub fn parse(descriptor: &str) -> Result<Self, UnsupportedDataSource> {
        let family =
            DataSourceFamily::detect(descriptor).ok_or_else(|| UnsupportedDataSource {
                descriptor: redact_url_credentials(descriptor.trim()),
            })?;
        Ok(Self {
            family,
            connection: strip_database_prefix(descriptor).to_string(),
        })
    }

    /// Filesystem path of a SQLite descriptor (`sqlite://x.db`, `sqlite:x.db`
    /// or a bare path).
    pub fn sqlite_path(&self) -> &str {
        let raw = self
            .connection
            .strip_prefix("sqlite://")
            .or_else(|| self.connection.strip_prefix("sqlite:"))
            .unwrap_or(&self.connection);
        raw.split('?').next().unwrap_or(raw)
    }
}

fn strip_database_prefix(descriptor: &str) -> &str {
    let trimmed = descriptor.trim();
    trimmed.strip_prefix(DATABASE_PREFIX).unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_families_by_prefix() {
        let cases = [
            ("database:postgresql://u@db/app", DataSourceFamily::Postgresql),
            ("postgres://db/app", DataSourceFamily::Postgresql),
            ("database:mysql://root@db/shop", DataSourceFamily::Mysql),
            ("mariadb://db/shop", DataSourceFamily::Mysql),
            ("database:mongodb+srv://cluster/app", DataSourceFamily::Mongodb),
            ("sqlite:///var/lib/app.db", DataSourceFamily::Sqlite),
            ("database:/srv/data/app.sqlite3", DataSourceFamily::Sqlite),
        ];
        for (descriptor, family) in cases {
            assert_eq!(DataSourceFamily::detect(descriptor), Some(family), "{descriptor}");
        }
    }

    #[test]
    fn unknown_descriptors_are_an_explicit_error() {
        assert_eq!(DataSourceFamily::detect("database:redis://cache"), None);
        let err = DataSource::parse("s3://bucket/prefix").unwrap_err();
        assert!(err.to_string().contains("unsupported data source"));
    }

    #[test]
    fn parse_strips_prefix_and_exposes_sqlite_path() {
        let source = DataSource::parse("database:sqlite:///tmp/app.db?mode=ro").unwrap();
        assert_eq!(source.connection, "sqlite:///tmp/app.db?mode=ro");
        assert_eq!(source.sqlite_path(), "/tmp/app.db");

        let bare = DataSource::parse("/tmp/data.sqlite").unwrap();
        assert_eq!(bare.sqlite_path(), "/tmp/data.sqlite");
    }

    #[test]
    fn categories() {
        assert_eq!(DataSourceFamily::Mysql.category(), FamilyCategory::Relational);
        assert_eq!(DataSourceFamily::Mongodb.category(), FamilyCategory::Document);
    }
}
