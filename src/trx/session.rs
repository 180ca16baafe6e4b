use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::{debug, warn};

use crate::access::User;
use crate::buffer::BufferManager;
use crate::config::paths::{ResourcePaths, RESOURCE_DATA_FILE};
use crate::config::ResourceConfiguration;
use crate::crypto::KeySet;
use crate::error::{DbError, Result};
use crate::io::ByteHandlerPipeline;
use crate::page::trx::intent_file;
use crate::page::{PageReadTrx, PageTrxPool, PageWriteTrx, UberPage};
use crate::storage::{FileStorage, Storage};
use crate::trx::{NodeReadTrx, NodeWriteTrx, Session};

/// Read transactions pooled per session.
const TRX_POOL_CAPACITY: usize = 4;

/// Live handle for transacting against one resource.
///
/// Holds the storage handle, the byte-handler pipeline, the in-memory uber
/// page and the page-transaction pool. All mutation funnels through
/// [`Session::begin_node_trx`], guarded by the resource's write lock.
pub struct ResourceSession {
    config: ResourceConfiguration,
    buffers: Arc<BufferManager>,
    write_lock: Arc<ReentrantMutex<()>>,
    storage: Arc<dyn Storage>,
    pipeline: ByteHandlerPipeline,
    uber: RwLock<UberPage>,
    trx_pool: PageTrxPool,
    user: User,
    closed: AtomicBool,
    close_hook: Mutex<Option<Box<dyn FnOnce(&Path) + Send>>>,
}

impl ResourceSession {
    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(DbError::State(format!(
                "session for resource '{}' is closed",
                self.config.name
            )));
        }
        Ok(())
    }

    pub fn config(&self) -> &ResourceConfiguration {
        &self.config
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub(crate) fn uber_snapshot(&self) -> UberPage {
        self.uber.read().clone()
    }

    pub(crate) fn publish_uber(&self, uber: UberPage) {
        *self.uber.write() = uber;
    }

    pub(crate) fn buffers(&self) -> &Arc<BufferManager> {
        &self.buffers
    }

    pub(crate) fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub(crate) fn pipeline(&self) -> &ByteHandlerPipeline {
        &self.pipeline
    }

    pub(crate) fn release_read_trx(&self, trx: PageReadTrx) {
        let current = self.uber.read().latest_revision();
        self.trx_pool.release(trx, current);
    }

    /// Begins a read transaction over `revision`.
    ///
    /// Never blocks on the write lock; a transaction over the most recent
    /// revision reuses a pooled page transaction when one is available.
    pub fn begin_node_read_trx(&self, revision: u64) -> Result<NodeReadTrx<'_>> {
        self.ensure_open()?;
        let uber = self.uber_snapshot();
        if uber.revision_count() == 0 {
            return Err(DbError::Usage(format!(
                "resource '{}' has no committed revisions",
                self.config.name
            )));
        }
        if revision > uber.latest_revision() {
            return Err(DbError::Usage(format!(
                "revision {revision} does not exist (latest is {})",
                uber.latest_revision()
            )));
        }

        let page_trx = match self.trx_pool.acquire(revision) {
            Some(pooled) => pooled,
            None => PageReadTrx::open(
                revision,
                &uber,
                Arc::clone(&self.buffers),
                Arc::clone(&self.storage),
                self.pipeline.clone(),
            )?,
        };
        Ok(NodeReadTrx::new(self, page_trx))
    }

    /// Read transaction over the most recent revision.
    pub fn begin_most_recent_node_read_trx(&self) -> Result<NodeReadTrx<'_>> {
        let revision = self.most_recent_revision_number();
        self.begin_node_read_trx(revision)
    }
}

impl Session for ResourceSession {
    fn open(
        config: ResourceConfiguration,
        buffers: Arc<BufferManager>,
        write_lock: Arc<ReentrantMutex<()>>,
        user: User,
    ) -> Result<Arc<Self>> {
        let data_dir = ResourcePaths::Data.path(&config.path);
        let storage: Arc<dyn Storage> =
            Arc::new(FileStorage::open(&data_dir.join(RESOURCE_DATA_FILE))?);

        let key_set = if config.use_encryption {
            Some(KeySet::load(
                &ResourcePaths::EncryptionKey.path(&config.path),
            )?)
        } else {
            None
        };
        let pipeline = ByteHandlerPipeline::for_resource(&config, key_set.as_ref())?;

        let uber = UberPage::load(&data_dir)?.unwrap_or_else(UberPage::empty);

        // A leftover intent marker means a crash inside a commit window.
        // The rename swing makes that harmless, the marker is just noise.
        let intent = intent_file(&config.path);
        if intent.exists() {
            warn!(resource = %config.name, "removing stale commit intent marker");
            fs::remove_file(&intent)?;
        }

        debug!(resource = %config.name, revisions = uber.revision_count(), "opened resource session");
        Ok(Arc::new(Self {
            config,
            buffers,
            write_lock,
            storage,
            pipeline,
            uber: RwLock::new(uber),
            trx_pool: PageTrxPool::new(TRX_POOL_CAPACITY),
            user,
            closed: AtomicBool::new(false),
            close_hook: Mutex::new(None),
        }))
    }

    fn resource_path(&self) -> &Path {
        &self.config.path
    }

    fn most_recent_revision_number(&self) -> u64 {
        self.uber.read().latest_revision()
    }

    fn prime_page_trx_pool(&self) -> Result<()> {
        let uber = self.uber_snapshot();
        if uber.revision_count() == 0 {
            return Ok(());
        }
        self.trx_pool.prime(
            uber.latest_revision(),
            &uber,
            &self.buffers,
            &self.storage,
            &self.pipeline,
        )
    }

    fn begin_node_trx(&self) -> Result<NodeWriteTrx<'_>> {
        self.ensure_open()?;
        let guard = self.write_lock.lock();
        // The closed flag may have flipped while this thread was blocked.
        self.ensure_open()?;

        let uber = self.uber_snapshot();
        let database_type = self.config.database_type;
        let page_trx = PageWriteTrx::begin(
            &uber,
            Arc::clone(&self.buffers),
            Arc::clone(&self.storage),
            self.pipeline.clone(),
            move || database_type.document_node(None),
        )?;
        Ok(NodeWriteTrx::new(self, guard, page_trx))
    }

    fn set_close_hook(&self, hook: Box<dyn FnOnce(&Path) + Send>) {
        *self.close_hook.lock() = Some(hook);
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.trx_pool.clear();
        if let Some(hook) = self.close_hook.lock().take() {
            hook(&self.config.path);
        }
        debug!(resource = %self.config.name, "closed resource session");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for ResourceSession {
    fn drop(&mut self) {
        if !self.is_closed() {
            let _ = self.close();
        }
    }
}
