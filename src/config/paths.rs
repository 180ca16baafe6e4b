// Closed sets of the directory and file names that make up a database and
// a resource on disk. Other tools inspect this layout, so the names are
// load-bearing and never derived.

use std::path::{Path, PathBuf};

/// Entries directly under a database directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabasePaths {
    /// `data/`: one subdirectory per resource.
    Data,
    /// `config.json`: the serialized [`DatabaseConfiguration`].
    ///
    /// [`DatabaseConfiguration`]: crate::config::DatabaseConfiguration
    ConfigFile,
    /// `lock`: zero-byte presence file while the database is open.
    LockFile,
}

impl DatabasePaths {
    pub const ALL: [DatabasePaths; 3] = [
        DatabasePaths::Data,
        DatabasePaths::ConfigFile,
        DatabasePaths::LockFile,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            DatabasePaths::Data => "data",
            DatabasePaths::ConfigFile => "config.json",
            DatabasePaths::LockFile => "lock",
        }
    }

    pub fn is_directory(self) -> bool {
        matches!(self, DatabasePaths::Data)
    }

    pub fn path(self, db_path: &Path) -> PathBuf {
        db_path.join(self.file_name())
    }

    /// True iff `db_path` carries the canonical database structure. The
    /// lock file is transient and not part of the check.
    pub fn compare_structure(db_path: &Path) -> bool {
        db_path.is_dir()
            && DatabasePaths::ConfigFile.path(db_path).is_file()
            && DatabasePaths::Data.path(db_path).is_dir()
    }
}

/// Entries directly under a resource directory (`<db>/data/<name>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePaths {
    /// `data/`: the page file and the uber file.
    Data,
    /// `log/`: the commit intent log.
    IntentLog,
    /// `indexes/`: secondary index storage.
    Indexes,
    /// `path-summary/`: the path summary tree.
    PathSummary,
    /// `settings.json`: the serialized [`ResourceConfiguration`].
    ///
    /// [`ResourceConfiguration`]: crate::config::ResourceConfiguration
    Settings,
    /// `encryptionKey.json`: the key set, present only when encryption is
    /// enabled for the resource.
    EncryptionKey,
}

impl ResourcePaths {
    pub const ALL: [ResourcePaths; 6] = [
        ResourcePaths::Data,
        ResourcePaths::IntentLog,
        ResourcePaths::Indexes,
        ResourcePaths::PathSummary,
        ResourcePaths::Settings,
        ResourcePaths::EncryptionKey,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ResourcePaths::Data => "data",
            ResourcePaths::IntentLog => "log",
            ResourcePaths::Indexes => "indexes",
            ResourcePaths::PathSummary => "path-summary",
            ResourcePaths::Settings => "settings.json",
            ResourcePaths::EncryptionKey => "encryptionKey.json",
        }
    }

    pub fn is_directory(self) -> bool {
        matches!(
            self,
            ResourcePaths::Data
                | ResourcePaths::IntentLog
                | ResourcePaths::Indexes
                | ResourcePaths::PathSummary
        )
    }

    pub fn path(self, resource_path: &Path) -> PathBuf {
        resource_path.join(self.file_name())
    }
}

/// Page file inside [`ResourcePaths::Data`].
pub const RESOURCE_DATA_FILE: &str = "resource.bin";
/// Uber file inside [`ResourcePaths::Data`]; atomically replaced on commit.
pub const UBER_FILE: &str = "uber.bin";
/// Temporary uber file written before the rename swing.
pub const UBER_FILE_TMP: &str = "uber.bin.tmp";
/// Commit intent marker inside [`ResourcePaths::IntentLog`].
pub const COMMIT_INTENT_FILE: &str = "commit.intent";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_structure_check() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!DatabasePaths::compare_structure(dir.path()));

        std::fs::create_dir(DatabasePaths::Data.path(dir.path())).unwrap();
        std::fs::write(DatabasePaths::ConfigFile.path(dir.path()), b"{}").unwrap();
        assert!(DatabasePaths::compare_structure(dir.path()));
    }

    #[test]
    fn resource_entries_are_a_closed_set() {
        let dirs: Vec<_> = ResourcePaths::ALL
            .iter()
            .filter(|p| p.is_directory())
            .map(|p| p.file_name())
            .collect();
        assert_eq!(dirs, vec!["data", "log", "indexes", "path-summary"]);
    }
}
