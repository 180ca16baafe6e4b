use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

/// Thread-safe many-to-many registry from a filesystem path to the set of
/// live objects rooted there. Backs both the database-sessions registry
/// and the resource-sessions registry.
///
/// Membership is by `Arc` identity. All operations go through one mutex,
/// which makes them linearizable and keeps the collapse-to-empty removal
/// atomic with the inner removal: `contains_any_entry` can never observe
/// an empty bucket.
pub struct PathBasedPool<T> {
    buckets: Mutex<HashMap<PathBuf, Vec<Arc<T>>>>,
}

impl<T> PathBasedPool<T> {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts `value` into the bucket for `path`, creating the bucket if
    /// absent. Re-inserting the same `Arc` is a no-op.
    pub fn put_object(&self, path: &Path, value: &Arc<T>) {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(path.to_path_buf()).or_default();
        if !bucket.iter().any(|existing| Arc::ptr_eq(existing, value)) {
            bucket.push(Arc::clone(value));
        }
    }

    /// Removes `value`; a bucket emptied by the removal is dropped in the
    /// same critical section.
    pub fn remove_object(&self, path: &Path, value: &Arc<T>) {
        let mut buckets = self.buckets.lock();
        if let Some(bucket) = buckets.get_mut(path) {
            bucket.retain(|existing| !Arc::ptr_eq(existing, value));
            if bucket.is_empty() {
                buckets.remove(path);
            }
        }
    }

    /// True iff a non-empty bucket exists for `path`.
    pub fn contains_any_entry(&self, path: &Path) -> bool {
        self.buckets.lock().contains_key(path)
    }

    /// Live objects registered under `path`.
    pub fn get_objects(&self, path: &Path) -> Vec<Arc<T>> {
        self.buckets
            .lock()
            .get(path)
            .map(|bucket| bucket.to_vec())
            .unwrap_or_default()
    }

    /// Defensive snapshot of the whole registry; mutating it does not
    /// affect the pool.
    pub fn as_map(&self) -> HashMap<PathBuf, Vec<Arc<T>>> {
        self.buckets.lock().clone()
    }
}

impl<T> Default for PathBasedPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn bucket_collapses_on_last_removal() {
        let pool = PathBasedPool::new();
        let path = Path::new("/db/data/doc");
        let a = Arc::new("a");
        let b = Arc::new("b");

        pool.put_object(path, &a);
        pool.put_object(path, &b);
        assert!(pool.contains_any_entry(path));

        pool.remove_object(path, &a);
        assert!(pool.contains_any_entry(path));
        pool.remove_object(path, &b);
        assert!(!pool.contains_any_entry(path));
        assert!(pool.as_map().is_empty());
    }

    #[test]
    fn membership_is_by_identity_not_equality() {
        let pool = PathBasedPool::new();
        let path = Path::new("/db");
        let a = Arc::new(42);
        let twin = Arc::new(42);

        pool.put_object(path, &a);
        pool.remove_object(path, &twin);
        assert!(pool.contains_any_entry(path));
    }

    #[test]
    fn reinserting_the_same_arc_is_a_noop() {
        let pool = PathBasedPool::new();
        let path = Path::new("/db");
        let a = Arc::new(1);
        pool.put_object(path, &a);
        pool.put_object(path, &a);
        assert_eq!(pool.get_objects(path).len(), 1);
    }

    #[test]
    fn concurrent_put_remove_never_leaves_an_empty_bucket() {
        let pool = Arc::new(PathBasedPool::new());
        let path = PathBuf::from("/contended");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let path = path.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        let value = Arc::new(0u8);
                        pool.put_object(&path, &value);
                        // A path present in a snapshot implies a non-empty
                        // bucket in that snapshot.
                        if let Some(bucket) = pool.as_map().get(&path) {
                            assert!(!bucket.is_empty());
                        }
                        pool.remove_object(&path, &value);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!pool.contains_any_entry(&path));
    }
}
