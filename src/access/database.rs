use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::access::buffers::BufferManagerMap;
use crate::access::path_pool::PathBasedPool;
use crate::access::resource_store::ResourceStore;
use crate::access::write_locks::WriteLocksRegistry;
use crate::access::{DatabaseType, User};
use crate::config::paths::{DatabasePaths, ResourcePaths};
use crate::config::{DatabaseConfiguration, ResourceConfiguration};
use crate::error::{DbError, Result};
use crate::trx::{ResourceSession, Session};
use crate::utils::remove_recursively;

/// Resource-name ↔ resource-ID bijection of one database.
#[derive(Default)]
struct ResourceMapping {
    by_name: HashMap<String, u64>,
    by_id: HashMap<u64, String>,
}

impl ResourceMapping {
    fn insert(&mut self, name: &str, id: u64) {
        self.by_name.insert(name.to_string(), id);
        self.by_id.insert(id, name.to_string());
    }

    fn remove_by_name(&mut self, name: &str) {
        if let Some(id) = self.by_name.remove(name) {
            self.by_id.remove(&id);
        }
    }

    fn id_of(&self, name: &str) -> Option<u64> {
        self.by_name.get(name).copied()
    }

    fn name_of(&self, id: u64) -> Option<String> {
        self.by_id.get(&id).cloned()
    }
}

/// One opened database directory.
///
/// Owns the configuration, the resource-name↔ID bijection, the resource
/// store and the per-resource buffer managers. Registered in the
/// environment's database-sessions pool while open; `close` deregisters it
/// and removes the lock file. The OPEN → CLOSED transition is irrevocable
/// for the instance.
pub struct Database<R: Session = ResourceSession> {
    me: Weak<Database<R>>,
    db_path: PathBuf,
    database_type: DatabaseType,
    user: User,
    config: Mutex<DatabaseConfiguration>,
    mapping: RwLock<ResourceMapping>,
    resource_store: ResourceStore<R>,
    buffers: BufferManagerMap,
    write_locks: Arc<WriteLocksRegistry>,
    session_pool: Arc<PathBasedPool<R>>,
    db_pool: Arc<PathBasedPool<Database<R>>>,
    // Coarse lock serializing resource create/remove against each other.
    mutator_lock: Mutex<()>,
    closed: AtomicBool,
}

impl<R: Session> std::fmt::Debug for Database<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("db_path", &self.db_path)
            .field("database_type", &self.database_type)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<R: Session> Database<R> {
    pub(crate) fn new(
        config: DatabaseConfiguration,
        user: User,
        db_pool: Arc<PathBasedPool<Database<R>>>,
        session_pool: Arc<PathBasedPool<R>>,
        write_locks: Arc<WriteLocksRegistry>,
    ) -> Result<Arc<Self>> {
        let db_path = config.path.clone();
        let database_type = config.database_type;

        let mut mapping = ResourceMapping::default();
        let data_dir = DatabasePaths::Data.path(&db_path);
        for entry in fs::read_dir(&data_dir)? {
            let resource_path = entry?.path();
            if !resource_path.is_dir() {
                continue;
            }
            match ResourceConfiguration::deserialize(&resource_path) {
                Ok(rc) => mapping.insert(&rc.name, rc.resource_id),
                Err(e) => warn!(
                    path = %resource_path.display(),
                    error = %e,
                    "skipping resource with unreadable settings"
                ),
            }
        }

        let database = Arc::new_cyclic(|me| Database {
            me: me.clone(),
            db_path: db_path.clone(),
            database_type,
            user,
            config: Mutex::new(config),
            mapping: RwLock::new(mapping),
            resource_store: ResourceStore::new(Arc::clone(&session_pool)),
            buffers: BufferManagerMap::new(),
            write_locks,
            session_pool,
            db_pool: Arc::clone(&db_pool),
            mutator_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        });
        db_pool.put_object(&db_path, &database);
        debug!(path = %db_path.display(), "opened database");
        Ok(database)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(DbError::State(format!(
                "database '{}' is closed",
                self.get_name()
            )));
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        !self.is_closed()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn get_name(&self) -> String {
        self.config.lock().database_name.clone()
    }

    pub fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    pub fn resource_path(&self, name: &str) -> PathBuf {
        DatabasePaths::Data.path(&self.db_path).join(name)
    }

    /// Per-resource buffer managers of this database.
    pub fn buffer_managers(&self) -> &BufferManagerMap {
        &self.buffers
    }

    /// True iff at least one session is currently open for `name`.
    pub fn has_open_resource_session(&self, name: &str) -> bool {
        self.resource_store
            .has_open_resource_session(&self.resource_path(name))
    }

    /// Creates a resource and bootstraps it with an empty committed
    /// revision. Returns `Ok(false)` when the resource already exists; any
    /// later failure removes the partial substructure before surfacing.
    pub fn create_resource(&self, config: ResourceConfiguration) -> Result<bool> {
        self.ensure_open()?;
        let _guard = self.mutator_lock.lock();

        let name = config.name.clone();
        let resource_path = self.resource_path(&name);
        if resource_path.exists() {
            return Ok(false);
        }

        match self.create_resource_inner(config, &resource_path) {
            Ok(()) => Ok(true),
            Err(e) => {
                if let Err(cleanup) = remove_recursively(&resource_path) {
                    warn!(
                        path = %resource_path.display(),
                        error = %cleanup,
                        "could not clean up partial resource"
                    );
                }
                self.mapping.write().remove_by_name(&name);
                self.buffers.remove(&resource_path);
                self.write_locks.remove_write_lock(&resource_path);
                Err(e)
            }
        }
    }

    fn create_resource_inner(
        &self,
        mut config: ResourceConfiguration,
        resource_path: &Path,
    ) -> Result<()> {
        fs::create_dir_all(resource_path)?;
        for entry in ResourcePaths::ALL {
            if entry.is_directory() {
                fs::create_dir_all(entry.path(resource_path))?;
            }
        }

        if config.use_encryption {
            let key_set = crate::crypto::KeySet::generate();
            key_set.persist(&ResourcePaths::EncryptionKey.path(resource_path))?;
        }

        // Assign the ID and persist the advanced counter before anything
        // can observe the new resource.
        let resource_id = {
            let mut db_config = self.config.lock();
            let id = db_config.max_resource_id;
            db_config.max_resource_id += 1;
            db_config.serialize()?;
            id
        };
        config.resource_id = resource_id;
        config.database_type = self.database_type;
        config.path = resource_path.to_path_buf();
        config.serialize()?;
        self.mapping.write().insert(&config.name, resource_id);

        self.bootstrap(config, resource_path)
            .map_err(|e| DbError::Bootstrap(e.to_string()))
    }

    /// Opens a throwaway session and commits the initial empty revision so
    /// the first post-create reader sees a valid uber page.
    fn bootstrap(&self, config: ResourceConfiguration, resource_path: &Path) -> Result<()> {
        let buffers = self
            .buffers
            .get_or_create(resource_path, config.storage_kind);
        let write_lock = self.write_locks.get_write_lock(resource_path);
        let session = self.resource_store.begin_resource_session(
            config,
            buffers,
            write_lock,
            self.user.clone(),
        )?;
        let result = session.begin_node_trx().and_then(|trx| trx.commit());
        self.resource_store.close_resource_session(resource_path)?;
        result.map(|_| ())
    }

    /// Returns the open session for `name`, or opens one.
    pub fn begin_resource_session(&self, name: &str) -> Result<Arc<R>> {
        self.ensure_open()?;
        let resource_path = self.resource_path(name);
        if !resource_path.exists() {
            return Err(DbError::Usage(format!(
                "resource '{name}' does not exist in database '{}'",
                self.get_name()
            )));
        }
        if let Some(session) = self.resource_store.get_open_resource_session(&resource_path) {
            return Ok(session);
        }

        let config = ResourceConfiguration::deserialize(&resource_path)?;
        self.mapping.write().insert(&config.name, config.resource_id);
        let buffers = self
            .buffers
            .get_or_create(&resource_path, config.storage_kind);
        let write_lock = self.write_locks.get_write_lock(&resource_path);
        self.resource_store
            .begin_resource_session(config, buffers, write_lock, self.user.clone())
    }

    /// Removes a resource from disk and drops its write-lock and
    /// buffer-manager entries. Fails while any session is open for it.
    pub fn remove_resource(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.mutator_lock.lock();

        let resource_path = self.resource_path(name);
        if !resource_path.exists() {
            return Err(DbError::Usage(format!(
                "resource '{name}' does not exist in database '{}'",
                self.get_name()
            )));
        }
        if self.session_pool.contains_any_entry(&resource_path) {
            return Err(DbError::Usage(format!(
                "resource '{name}' has open sessions"
            )));
        }

        remove_recursively(&resource_path)?;
        self.write_locks.remove_write_lock(&resource_path);
        self.buffers.remove(&resource_path);
        self.mapping.write().remove_by_name(name);
        debug!(resource = name, "removed resource");
        Ok(())
    }

    pub fn exists_resource(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        let resource_path = self.resource_path(name);
        Ok(resource_path.is_dir() && ResourcePaths::Settings.path(&resource_path).is_file())
    }

    /// Names of all resources, sorted.
    pub fn list_resources(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let mut names = Vec::new();
        let data_dir = DatabasePaths::Data.path(&self.db_path);
        for entry in fs::read_dir(&data_dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn get_resource_id(&self, name: &str) -> Result<u64> {
        self.ensure_open()?;
        if let Some(id) = self.mapping.read().id_of(name) {
            return Ok(id);
        }
        // A resource created by an earlier process may not be in the
        // bijection yet; fall back to its settings file.
        let resource_path = self.resource_path(name);
        let config = ResourceConfiguration::deserialize(&resource_path).map_err(|_| {
            DbError::Usage(format!(
                "resource '{name}' does not exist in database '{}'",
                self.get_name()
            ))
        })?;
        self.mapping.write().insert(&config.name, config.resource_id);
        Ok(config.resource_id)
    }

    pub fn get_resource_name(&self, id: u64) -> Result<String> {
        self.ensure_open()?;
        self.mapping.read().name_of(id).ok_or_else(|| {
            DbError::Usage(format!(
                "no resource with ID {id} in database '{}'",
                self.get_name()
            ))
        })
    }

    /// Idempotent close: tears down the resource store, deregisters from
    /// the database-sessions pool and removes the lock file.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.resource_store.close() {
            warn!(error = %e, "best-effort resource store teardown failed");
        }
        self.buffers.clear();
        if let Some(me) = self.me.upgrade() {
            self.db_pool.remove_object(&self.db_path, &me);
        }

        let lock_file = DatabasePaths::LockFile.path(&self.db_path);
        match fs::remove_file(&lock_file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            // Leaving the lock file behind would wrongly fence out every
            // future open, so this one surfaces.
            Err(e) => return Err(e.into()),
        }
        debug!(path = %self.db_path.display(), "closed database");
        Ok(())
    }
}

impl<R: Session> Drop for Database<R> {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.close() {
                warn!(error = %e, "error while closing database on drop");
            }
        }
    }
}
