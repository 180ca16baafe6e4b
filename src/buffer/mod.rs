// Per-resource buffer management: one `BufferManager` bundles the caches a
// resource's transactions read through. Capacities depend on the storage
// backend, because memory-mapped backings tolerate far larger caches.

pub mod cache;

pub use cache::Cache;

use std::sync::Arc;

use crate::config::StorageKind;
use crate::node::Node;
use crate::page::{PageReference, RecordPage, RevisionRootPage};

/// Cache capacities for one storage kind.
#[derive(Debug, Clone, Copy)]
pub struct BufferConfig {
    pub page_cache_size: usize,
    pub record_page_cache_size: usize,
    pub revision_root_cache_size: usize,
    pub node_page_cache_size: usize,
    pub trail_cache_size: usize,
}

impl BufferConfig {
    pub fn for_storage_kind(kind: StorageKind) -> Self {
        match kind {
            StorageKind::MemoryMapped => Self {
                page_cache_size: 100,
                record_page_cache_size: 10_000_000,
                revision_root_cache_size: 100_000,
                node_page_cache_size: 50_000_000,
                trail_cache_size: 1_000,
            },
            StorageKind::File => Self {
                page_cache_size: 50_000,
                record_page_cache_size: 10_000_000,
                revision_root_cache_size: 100_000,
                node_page_cache_size: 50_000_000,
                trail_cache_size: 1_000,
            },
        }
    }
}

/// Cache bundle for one resource.
///
/// Frames and decoded pages are keyed by their storage offset, which is
/// stable across revisions and therefore shares unchanged pages between
/// revisions for free. Revision-scoped lookups carry the revision in the
/// key.
pub struct BufferManager {
    /// Raw decoded frames by storage offset.
    pages: Cache<u64, Arc<Vec<u8>>>,
    /// Decoded record pages by storage offset.
    record_pages: Cache<u64, Arc<RecordPage>>,
    /// Revision root pages by revision number.
    revision_roots: Cache<u64, Arc<RevisionRootPage>>,
    /// Resolved nodes by (revision, node key).
    nodes: Cache<(u64, u64), Arc<Node>>,
    /// Lookup trails: (revision, record-page number) to the page reference
    /// the walk resolved to.
    trails: Cache<(u64, u64), PageReference>,
}

impl BufferManager {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            pages: Cache::new(config.page_cache_size),
            record_pages: Cache::new(config.record_page_cache_size),
            revision_roots: Cache::new(config.revision_root_cache_size),
            nodes: Cache::new(config.node_page_cache_size),
            trails: Cache::new(config.trail_cache_size),
        }
    }

    pub fn for_storage_kind(kind: StorageKind) -> Self {
        Self::new(BufferConfig::for_storage_kind(kind))
    }

    pub fn pages(&self) -> &Cache<u64, Arc<Vec<u8>>> {
        &self.pages
    }

    pub fn record_pages(&self) -> &Cache<u64, Arc<RecordPage>> {
        &self.record_pages
    }

    pub fn revision_roots(&self) -> &Cache<u64, Arc<RevisionRootPage>> {
        &self.revision_roots
    }

    pub fn nodes(&self) -> &Cache<(u64, u64), Arc<Node>> {
        &self.nodes
    }

    pub fn trails(&self) -> &Cache<(u64, u64), PageReference> {
        &self.trails
    }

    /// Drops every cached entry; used on session teardown.
    pub fn clear(&self) {
        self.pages.clear();
        self.record_pages.clear();
        self.revision_roots.clear();
        self.nodes.clear();
        self.trails.clear();
    }
}
