use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use crate::buffer::BufferManager;
use crate::config::StorageKind;

/// Per-database map from resource path to that resource's buffer manager.
///
/// Entries are created lazily on the first session open (sized for the
/// resource's storage backend) and evicted when the resource is removed.
pub struct BufferManagerMap {
    managers: DashMap<PathBuf, Arc<BufferManager>>,
}

impl BufferManagerMap {
    pub fn new() -> Self {
        Self {
            managers: DashMap::new(),
        }
    }

    pub fn get_or_create(&self, resource_path: &Path, kind: StorageKind) -> Arc<BufferManager> {
        self.managers
            .entry(resource_path.to_path_buf())
            .or_insert_with(|| Arc::new(BufferManager::for_storage_kind(kind)))
            .clone()
    }

    pub fn get(&self, resource_path: &Path) -> Option<Arc<BufferManager>> {
        self.managers.get(resource_path).map(|entry| entry.clone())
    }

    pub fn has_buffer_manager(&self, resource_path: &Path) -> bool {
        self.managers.contains_key(resource_path)
    }

    pub fn remove(&self, resource_path: &Path) -> bool {
        self.managers.remove(resource_path).is_some()
    }

    pub fn clear(&self) {
        self.managers.clear();
    }
}

impl Default for BufferManagerMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazily_creates_one_manager_per_path() {
        let map = BufferManagerMap::new();
        let path = Path::new("/db/data/doc");
        assert!(!map.has_buffer_manager(path));

        let a = map.get_or_create(path, StorageKind::File);
        let b = map.get_or_create(path, StorageKind::File);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(map.has_buffer_manager(path));
    }

    #[test]
    fn remove_evicts_the_entry() {
        let map = BufferManagerMap::new();
        let path = Path::new("/db/data/doc");
        map.get_or_create(path, StorageKind::MemoryMapped);
        assert!(map.remove(path));
        assert!(!map.has_buffer_manager(path));
        assert!(!map.remove(path));
    }
}
