// Process-wide lifecycle operations: create, open, truncate and existence
// checks for databases, plus cross-process exclusion via the lock file.
//
// All shared state lives in an explicit `Environment` value rather than
// hidden globals; embedders normally go through the free functions backed
// by the process-default environment, tests build a fresh one per case.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::access::path_pool::PathBasedPool;
use crate::access::write_locks::WriteLocksRegistry;
use crate::access::{Database, User};
use crate::config::paths::DatabasePaths;
use crate::config::DatabaseConfiguration;
use crate::error::{DbError, Result};
use crate::trx::ResourceSession;
use crate::utils::remove_recursively;

/// Process-wide registries behind the database lifecycle operations.
///
/// Operations are serialized on one mutex because they inspect and mutate
/// global directory state; everything else the environment holds is
/// internally thread-safe.
pub struct Environment {
    databases: Arc<PathBasedPool<Database>>,
    sessions: Arc<PathBasedPool<ResourceSession>>,
    write_locks: Arc<WriteLocksRegistry>,
    ops_lock: Mutex<()>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            databases: Arc::new(PathBasedPool::new()),
            sessions: Arc::new(PathBasedPool::new()),
            write_locks: Arc::new(WriteLocksRegistry::new()),
            ops_lock: Mutex::new(()),
        }
    }

    /// Pool of open database handles, keyed by database directory.
    pub fn databases(&self) -> &Arc<PathBasedPool<Database>> {
        &self.databases
    }

    /// Pool of open resource sessions, keyed by resource path.
    pub fn sessions(&self) -> &Arc<PathBasedPool<ResourceSession>> {
        &self.sessions
    }

    pub fn write_locks(&self) -> &Arc<WriteLocksRegistry> {
        &self.write_locks
    }

    /// Creates the database directory tree and serializes its
    /// configuration. Returns `Ok(false)` when the directory already
    /// exists (the filesystem is left untouched) or when creation fails
    /// partway (the partial tree is removed).
    pub fn create_database(&self, config: &DatabaseConfiguration) -> Result<bool> {
        let _guard = self.ops_lock.lock();
        let db_path = &config.path;
        if db_path.exists() {
            return Ok(false);
        }

        let created = (|| -> Result<()> {
            fs::create_dir_all(db_path)?;
            fs::create_dir(DatabasePaths::Data.path(db_path))?;
            config.serialize()?;
            Ok(())
        })();

        match created {
            Ok(()) => {
                debug!(path = %db_path.display(), "created database");
                Ok(true)
            }
            Err(e) => {
                warn!(path = %db_path.display(), error = %e, "database creation failed");
                if let Err(cleanup) = remove_recursively(db_path) {
                    warn!(error = %cleanup, "could not clean up partial database");
                }
                Ok(false)
            }
        }
    }

    /// Opens the database at `db_path`, creating its lock file.
    ///
    /// A second open while an in-process handle exists returns that same
    /// handle. A lock file with no in-process handle signals a foreign
    /// process or a crashed prior run and is fatal; recovery requires the
    /// operator to remove the file.
    pub fn open_database(&self, db_path: &Path, user: User) -> Result<Arc<Database>> {
        let _guard = self.ops_lock.lock();
        if !DatabasePaths::compare_structure(db_path) {
            return Err(DbError::Usage(format!(
                "no database at {}",
                db_path.display()
            )));
        }

        if let Some(existing) = self.databases.get_objects(db_path).into_iter().next() {
            return Ok(existing);
        }

        let config = DatabaseConfiguration::deserialize(db_path)?;
        let lock_file = DatabasePaths::LockFile.path(db_path);
        if lock_file.exists() {
            return Err(DbError::Usage(format!(
                "database {} is locked by another process (or a crashed run; \
                 remove {} manually to recover)",
                db_path.display(),
                lock_file.display()
            )));
        }
        fs::write(&lock_file, b"")?;

        let database_type = config.database_type;
        match database_type.create_database(config, user, self) {
            Ok(database) => Ok(database),
            Err(e) => {
                // A failed open must not fence out the next attempt.
                if let Err(cleanup) = fs::remove_file(&lock_file) {
                    warn!(error = %cleanup, "could not remove lock file after failed open");
                }
                Err(e)
            }
        }
    }

    /// Recursively removes the database directory. Refused (returning
    /// `Ok(false)`) while any handle is registered for it.
    pub fn truncate_database(&self, db_path: &Path) -> Result<bool> {
        let _guard = self.ops_lock.lock();
        if self.databases.contains_any_entry(db_path) {
            return Ok(false);
        }
        if !db_path.exists() {
            return Ok(false);
        }
        remove_recursively(db_path)?;
        debug!(path = %db_path.display(), "truncated database");
        Ok(true)
    }

    /// True iff the directory exists and matches the canonical structure.
    pub fn exists_database(&self, db_path: &Path) -> bool {
        DatabasePaths::compare_structure(db_path)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_ENVIRONMENT: Lazy<Environment> = Lazy::new(Environment::new);

/// The process-default environment backing the free functions.
pub fn default_environment() -> &'static Environment {
    &DEFAULT_ENVIRONMENT
}

/// See [`Environment::create_database`].
pub fn create_database(config: &DatabaseConfiguration) -> Result<bool> {
    default_environment().create_database(config)
}

/// See [`Environment::open_database`].
pub fn open_database(db_path: &Path, user: User) -> Result<Arc<Database>> {
    default_environment().open_database(db_path, user)
}

/// See [`Environment::truncate_database`].
pub fn truncate_database(db_path: &Path) -> Result<bool> {
    default_environment().truncate_database(db_path)
}

/// See [`Environment::exists_database`].
pub fn exists_database(db_path: &Path) -> bool {
    default_environment().exists_database(db_path)
}
