use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::ReentrantMutex;
use tracing::debug;

use crate::access::path_pool::PathBasedPool;
use crate::access::User;
use crate::buffer::BufferManager;
use crate::config::ResourceConfiguration;
use crate::error::Result;
use crate::trx::Session;

/// Registry and factory for the open resource sessions of one database.
///
/// At most one live session exists per resource path; concurrent first
/// opens are serialized on the map entry, so exactly one session is
/// created and every caller receives it. Sessions are mirrored into the
/// process-wide resource-sessions pool, and a close hook keeps that mirror
/// coherent even when a session is closed directly.
pub struct ResourceStore<R: Session> {
    sessions: Arc<DashMap<PathBuf, Arc<R>>>,
    pool: Arc<PathBasedPool<R>>,
}

impl<R: Session> ResourceStore<R> {
    pub fn new(pool: Arc<PathBasedPool<R>>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            pool,
        }
    }

    /// Atomic get-or-create of the session for `config.path`.
    ///
    /// On creation the session is registered in the enclosing pool and,
    /// when the resource already has committed revisions, its
    /// page-transaction pool is primed.
    pub fn begin_resource_session(
        &self,
        config: ResourceConfiguration,
        buffers: Arc<BufferManager>,
        write_lock: Arc<ReentrantMutex<()>>,
        user: User,
    ) -> Result<Arc<R>> {
        let path = config.path.clone();
        // The map entry serializes racing first opens; everything that may
        // re-enter the map (priming failure teardown) runs after the entry
        // guard is released.
        let (session, created) = match self.sessions.entry(path.clone()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let session = R::open(config, buffers, write_lock, user)?;

                let sessions = Arc::clone(&self.sessions);
                let pool = Arc::clone(&self.pool);
                let weak = Arc::downgrade(&session);
                session.set_close_hook(Box::new(move |closed_path: &Path| {
                    if let Some(strong) = weak.upgrade() {
                        sessions.remove_if(closed_path, |_, s| Arc::ptr_eq(s, &strong));
                        pool.remove_object(closed_path, &strong);
                    }
                }));

                self.pool.put_object(&path, &session);
                entry.insert(Arc::clone(&session));
                (session, true)
            }
        };

        if created {
            if session.most_recent_revision_number() > 0 {
                if let Err(e) = session.prime_page_trx_pool() {
                    let _ = session.close();
                    return Err(e);
                }
            }
            debug!(path = %path.display(), "opened resource session");
        }
        Ok(session)
    }

    pub fn has_open_resource_session(&self, resource_path: &Path) -> bool {
        self.sessions.contains_key(resource_path)
    }

    pub fn get_open_resource_session(&self, resource_path: &Path) -> Option<Arc<R>> {
        self.sessions
            .get(resource_path)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Closes and deregisters the session for `resource_path`; returns
    /// whether anything was removed.
    pub fn close_resource_session(&self, resource_path: &Path) -> Result<bool> {
        match self.sessions.remove(resource_path) {
            Some((_, session)) => {
                session.close()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Closes every managed session, then clears the map.
    pub fn close(&self) -> Result<()> {
        let paths: Vec<PathBuf> = self
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for path in paths {
            self.close_resource_session(&path)?;
        }
        self.sessions.clear();
        Ok(())
    }

    pub fn open_session_count(&self) -> usize {
        self.sessions.len()
    }
}
