// Resource sessions and node-level transactions.
//
// The access layer consumes sessions through the `Session` trait; the
// concrete `ResourceSession` adds read transactions over any historical
// revision. One write transaction per resource at a time, enforced by the
// resource's reentrant write lock.

pub mod node_trx;
pub mod session;

pub use node_trx::{NodeReadTrx, NodeWriteTrx};
pub use session::ResourceSession;

use std::path::Path;
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::access::User;
use crate::buffer::BufferManager;
use crate::config::ResourceConfiguration;
use crate::error::Result;

/// Contract the access layer requires from a resource session.
///
/// `open` is the factory the resource store drives; the close hook is how
/// the store learns about sessions closed behind its back, keeping the
/// process-wide session pool coherent.
pub trait Session: Send + Sync + 'static {
    fn open(
        config: ResourceConfiguration,
        buffers: Arc<BufferManager>,
        write_lock: Arc<ReentrantMutex<()>>,
        user: User,
    ) -> Result<Arc<Self>>
    where
        Self: Sized;

    fn resource_path(&self) -> &Path;

    /// Number of the most recent committed revision (0 for a freshly
    /// bootstrapped resource).
    fn most_recent_revision_number(&self) -> u64;

    /// Fills the page-transaction pool with read transactions over the
    /// most recent revision.
    fn prime_page_trx_pool(&self) -> Result<()>;

    /// Begins the single node write transaction, blocking while another
    /// holder owns the resource's write lock.
    fn begin_node_trx(&self) -> Result<NodeWriteTrx<'_>>;

    /// Installs the teardown callback invoked exactly once on close.
    fn set_close_hook(&self, hook: Box<dyn FnOnce(&Path) + Send>);

    /// Idempotent; runs the close hook on the first call.
    fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}
