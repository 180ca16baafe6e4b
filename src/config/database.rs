// Database-wide configuration, serialized to `<db>/config.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::access::DatabaseType;
use crate::config::paths::DatabasePaths;
use crate::error::{DbError, Result};

/// Configuration of one database directory.
///
/// Immutable after construction except for `max_resource_id`, which the
/// owning database advances (and re-persists) whenever a resource is
/// created. The counter never decreases, so resource IDs are not reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfiguration {
    /// Runtime location of the database directory; not serialized, the
    /// file's own location is authoritative.
    #[serde(skip)]
    pub path: PathBuf,

    #[serde(rename = "databaseName")]
    pub database_name: String,

    #[serde(rename = "databaseType")]
    pub database_type: DatabaseType,

    #[serde(rename = "maxResourceID")]
    pub max_resource_id: u64,
}

impl DatabaseConfiguration {
    pub fn new(path: impl Into<PathBuf>, database_type: DatabaseType) -> Self {
        let path = path.into();
        let database_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            database_name,
            database_type,
            max_resource_id: 0,
        }
    }

    /// Writes `config.json` under the database directory.
    pub fn serialize(&self) -> Result<()> {
        let file = DatabasePaths::ConfigFile.path(&self.path);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(file, json)?;
        Ok(())
    }

    /// Reads `config.json` back; the database must have been created first.
    pub fn deserialize(db_path: &Path) -> Result<Self> {
        let file = DatabasePaths::ConfigFile.path(db_path);
        let raw = fs::read_to_string(&file).map_err(|e| {
            DbError::Config(format!("cannot read {}: {e}", file.display()))
        })?;
        let mut config: DatabaseConfiguration = serde_json::from_str(&raw)
            .map_err(|e| DbError::Config(format!("malformed {}: {e}", file.display())))?;
        config.path = db_path.to_path_buf();
        Ok(config)
    }

    pub fn database_path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_config_json() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("books");
        std::fs::create_dir(&db_path).unwrap();

        let mut config = DatabaseConfiguration::new(&db_path, DatabaseType::Json);
        config.max_resource_id = 7;
        config.serialize().unwrap();

        let loaded = DatabaseConfiguration::deserialize(&db_path).unwrap();
        assert_eq!(loaded.database_name, "books");
        assert_eq!(loaded.database_type, DatabaseType::Json);
        assert_eq!(loaded.max_resource_id, 7);
        assert_eq!(loaded.path, db_path);
    }

    #[test]
    fn deserialize_missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DatabaseConfiguration::deserialize(dir.path()).unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }
}
