use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::ReentrantMutex;

/// Registry of per-resource write locks, keyed by resource path.
///
/// Lookup is lazy get-or-create. The lock is reentrant so a writer that
/// re-enters transactional regions on the same resource within one thread
/// does not deadlock against itself. Removal is explicit and only done
/// when the resource is deleted; holders of a removed lock stay safe, the
/// entry is simply never handed out again.
pub struct WriteLocksRegistry {
    locks: DashMap<PathBuf, Arc<ReentrantMutex<()>>>,
}

impl WriteLocksRegistry {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub fn get_write_lock(&self, resource_path: &Path) -> Arc<ReentrantMutex<()>> {
        self.locks
            .entry(resource_path.to_path_buf())
            .or_insert_with(|| Arc::new(ReentrantMutex::new(())))
            .clone()
    }

    pub fn remove_write_lock(&self, resource_path: &Path) {
        self.locks.remove(resource_path);
    }

    pub fn has_write_lock(&self, resource_path: &Path) -> bool {
        self.locks.contains_key(resource_path)
    }
}

impl Default for WriteLocksRegistry {
    fn default() -> Self {
        Self::new()
    }
}
