// Page-level transactions: the read path resolves nodes through the buffer
// caches; the write path keeps a copy-on-write dirty set and publishes a
// revision by appending frames and swinging the uber page.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::buffer::BufferManager;
use crate::config::paths::{ResourcePaths, COMMIT_INTENT_FILE};
use crate::error::{DbError, Result};
use crate::io::ByteHandlerPipeline;
use crate::node::Node;
use crate::page::{PageReference, RecordPage, RevisionRootPage, UberPage};
use crate::storage::Storage;

fn decode_frame<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(value)
}

fn encode_frame<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(value, bincode::config::standard())?)
}

/// Read-only view of one committed revision.
pub struct PageReadTrx {
    revision: u64,
    revision_root: Arc<RevisionRootPage>,
    storage: Arc<dyn Storage>,
    pipeline: ByteHandlerPipeline,
    buffers: Arc<BufferManager>,
}

impl PageReadTrx {
    pub fn open(
        revision: u64,
        uber: &UberPage,
        buffers: Arc<BufferManager>,
        storage: Arc<dyn Storage>,
        pipeline: ByteHandlerPipeline,
    ) -> Result<Self> {
        let reference = uber.reference_for(revision).ok_or_else(|| {
            DbError::Usage(format!(
                "revision {revision} does not exist (latest is {})",
                uber.latest_revision()
            ))
        })?;

        let revision_root = match buffers.revision_roots().get(&revision) {
            Some(root) => root,
            None => {
                let frame = Self::load_frame(&buffers, &*storage, &pipeline, &reference)?;
                let root: RevisionRootPage = decode_frame(&frame)?;
                let root = Arc::new(root);
                buffers.revision_roots().put(revision, Arc::clone(&root));
                root
            }
        };

        Ok(Self {
            revision,
            revision_root,
            storage,
            pipeline,
            buffers,
        })
    }

    fn load_frame(
        buffers: &BufferManager,
        storage: &dyn Storage,
        pipeline: &ByteHandlerPipeline,
        reference: &PageReference,
    ) -> Result<Vec<u8>> {
        if let Some(frame) = buffers.pages().get(&reference.offset) {
            return Ok(frame.as_ref().clone());
        }
        let raw = storage.read(reference)?;
        let frame = pipeline.deserialize(&raw)?;
        buffers
            .pages()
            .put(reference.offset, Arc::new(frame.clone()));
        Ok(frame)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn revision_root(&self) -> &RevisionRootPage {
        &self.revision_root
    }

    /// Resolves the record page holding `page_number`, if this revision has
    /// one.
    pub fn get_record_page(&self, page_number: u64) -> Result<Option<Arc<RecordPage>>> {
        let reference = match self.buffers.trails().get(&(self.revision, page_number)) {
            Some(reference) => reference,
            None => match self.revision_root.record_page_refs.get(&page_number) {
                Some(reference) => {
                    self.buffers
                        .trails()
                        .put((self.revision, page_number), *reference);
                    *reference
                }
                None => return Ok(None),
            },
        };

        if let Some(page) = self.buffers.record_pages().get(&reference.offset) {
            return Ok(Some(page));
        }
        let frame = Self::load_frame(&self.buffers, &*self.storage, &self.pipeline, &reference)?;
        let page: RecordPage = decode_frame(&frame)?;
        let page = Arc::new(page);
        self.buffers
            .record_pages()
            .put(reference.offset, Arc::clone(&page));
        Ok(Some(page))
    }

    pub fn get_node(&self, node_key: u64) -> Result<Option<Arc<Node>>> {
        if let Some(node) = self.buffers.nodes().get(&(self.revision, node_key)) {
            return Ok(Some(node));
        }
        let Some(page) = self.get_record_page(RecordPage::page_number_of(node_key))? else {
            return Ok(None);
        };
        let Some(node) = page.get(node_key) else {
            return Ok(None);
        };
        let node = Arc::new(node.clone());
        self.buffers
            .nodes()
            .put((self.revision, node_key), Arc::clone(&node));
        Ok(Some(node))
    }
}

/// The single mutable view of a resource between two revisions.
pub struct PageWriteTrx {
    base: Option<PageReadTrx>,
    new_revision: u64,
    max_node_key: u64,
    dirty: HashMap<u64, RecordPage>,
    base_refs: BTreeMap<u64, PageReference>,
    storage: Arc<dyn Storage>,
    pipeline: ByteHandlerPipeline,
    buffers: Arc<BufferManager>,
}

impl PageWriteTrx {
    /// Opens the write transaction on top of the latest revision. For a
    /// resource with no revisions the transaction bootstraps itself with
    /// the supplied document root.
    pub fn begin(
        uber: &UberPage,
        buffers: Arc<BufferManager>,
        storage: Arc<dyn Storage>,
        pipeline: ByteHandlerPipeline,
        document_root: impl FnOnce() -> Node,
    ) -> Result<Self> {
        if uber.revision_count() == 0 {
            let root = document_root();
            let mut page = RecordPage::new(0);
            let root_key = root.node_key();
            page.put(root);
            let mut dirty = HashMap::new();
            dirty.insert(0, page);
            return Ok(Self {
                base: None,
                new_revision: 0,
                max_node_key: root_key,
                dirty,
                base_refs: BTreeMap::new(),
                storage,
                pipeline,
                buffers,
            });
        }

        let base = PageReadTrx::open(
            uber.latest_revision(),
            uber,
            Arc::clone(&buffers),
            Arc::clone(&storage),
            pipeline.clone(),
        )?;
        let base_refs = base.revision_root().record_page_refs.clone();
        let max_node_key = base.revision_root().max_node_key;
        let new_revision = base.revision() + 1;
        Ok(Self {
            base: Some(base),
            new_revision,
            max_node_key,
            dirty: HashMap::new(),
            base_refs,
            storage,
            pipeline,
            buffers,
        })
    }

    pub fn new_revision(&self) -> u64 {
        self.new_revision
    }

    pub fn max_node_key(&self) -> u64 {
        self.max_node_key
    }

    /// Hands out the next node key.
    pub fn assign_node_key(&mut self) -> u64 {
        self.max_node_key += 1;
        self.max_node_key
    }

    pub fn get_node(&self, node_key: u64) -> Result<Option<Node>> {
        let page_number = RecordPage::page_number_of(node_key);
        if let Some(page) = self.dirty.get(&page_number) {
            return Ok(page.get(node_key).cloned());
        }
        match &self.base {
            Some(base) => Ok(base.get_node(node_key)?.map(|n| n.as_ref().clone())),
            None => Ok(None),
        }
    }

    /// Inserts or replaces a node, cloning its record page into the dirty
    /// set on first touch.
    pub fn put_node(&mut self, node: Node) -> Result<()> {
        let page_number = RecordPage::page_number_of(node.node_key());
        let page = self.dirty_page(page_number)?;
        page.put(node);
        Ok(())
    }

    pub fn remove_node(&mut self, node_key: u64) -> Result<Option<Node>> {
        let page_number = RecordPage::page_number_of(node_key);
        let page = self.dirty_page(page_number)?;
        Ok(page.remove(node_key))
    }

    fn dirty_page(&mut self, page_number: u64) -> Result<&mut RecordPage> {
        if !self.dirty.contains_key(&page_number) {
            let page = match &self.base {
                Some(base) => match base.get_record_page(page_number)? {
                    Some(shared) => shared.as_ref().clone(),
                    None => RecordPage::new(page_number),
                },
                None => RecordPage::new(page_number),
            };
            self.dirty.insert(page_number, page);
        }
        Ok(self.dirty.get_mut(&page_number).expect("inserted above"))
    }

    /// Publishes the new revision and returns the swung uber page.
    ///
    /// Frames are appended first, then the revision root, then the uber
    /// page is atomically replaced; a crash before the swing leaves the
    /// previous revision in place.
    pub fn commit(
        mut self,
        uber: &UberPage,
        resource_path: &Path,
        author: String,
        commit_message: Option<String>,
        commit_timestamp: u64,
    ) -> Result<UberPage> {
        let data_dir = ResourcePaths::Data.path(resource_path);
        let intent = intent_file(resource_path);

        let mut record_page_refs = self.base_refs.clone();
        let mut committed_pages: Vec<(PageReference, RecordPage)> = Vec::new();
        for (page_number, page) in std::mem::take(&mut self.dirty) {
            let frame = encode_frame(&page)?;
            let stored = self.pipeline.serialize(&frame)?;
            let reference = self.storage.append(&stored)?;
            record_page_refs.insert(page_number, reference);
            committed_pages.push((reference, page));
        }

        let revision_root = RevisionRootPage {
            revision: self.new_revision,
            commit_timestamp,
            max_node_key: self.max_node_key,
            author,
            commit_message,
            record_page_refs,
        };
        let frame = encode_frame(&revision_root)?;
        let stored = self.pipeline.serialize(&frame)?;
        let root_reference = self.storage.append(&stored)?;
        self.storage.sync()?;

        // Intent marker: present only during the swing window. A stale
        // marker on open means a crash here, which the atomic rename
        // already makes harmless.
        fs::write(&intent, self.new_revision.to_le_bytes())?;

        let mut swung = uber.clone();
        swung.revision_roots.push(root_reference);
        swung.swing(&data_dir)?;

        if let Err(e) = fs::remove_file(&intent) {
            debug!(error = %e, "could not remove commit intent marker");
        }

        for (reference, page) in committed_pages {
            let page_number = page.page_number;
            self.buffers
                .record_pages()
                .put(reference.offset, Arc::new(page));
            self.buffers
                .trails()
                .put((self.new_revision, page_number), reference);
        }
        self.buffers
            .revision_roots()
            .put(self.new_revision, Arc::new(revision_root));

        debug!(revision = self.new_revision, "committed revision");
        Ok(swung)
    }

    /// Drops all uncommitted changes.
    pub fn abort(mut self) {
        self.dirty.clear();
    }
}

/// Path of the commit intent marker for a resource.
pub fn intent_file(resource_path: &Path) -> PathBuf {
    ResourcePaths::IntentLog
        .path(resource_path)
        .join(COMMIT_INTENT_FILE)
}

/// Pool of reusable read transactions over the most recent revision,
/// primed when a session opens a resource that already has revisions.
pub struct PageTrxPool {
    pool: Mutex<Vec<PageReadTrx>>,
    capacity: usize,
}

impl PageTrxPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Fills the pool with read transactions over `revision`.
    pub fn prime(
        &self,
        revision: u64,
        uber: &UberPage,
        buffers: &Arc<BufferManager>,
        storage: &Arc<dyn Storage>,
        pipeline: &ByteHandlerPipeline,
    ) -> Result<()> {
        let mut pool = self.pool.lock();
        pool.clear();
        for _ in 0..self.capacity {
            pool.push(PageReadTrx::open(
                revision,
                uber,
                Arc::clone(buffers),
                Arc::clone(storage),
                pipeline.clone(),
            )?);
        }
        Ok(())
    }

    /// Takes a pooled transaction over `revision`, if one is available.
    pub fn acquire(&self, revision: u64) -> Option<PageReadTrx> {
        let mut pool = self.pool.lock();
        let index = pool.iter().position(|trx| trx.revision() == revision)?;
        Some(pool.swap_remove(index))
    }

    /// Returns a transaction to the pool; stale revisions are dropped.
    pub fn release(&self, trx: PageReadTrx, current_revision: u64) {
        if trx.revision() != current_revision {
            return;
        }
        let mut pool = self.pool.lock();
        if pool.len() < self.capacity {
            pool.push(trx);
        }
    }

    pub fn len(&self) -> usize {
        self.pool.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.pool.lock().clear();
    }
}
