// Node-level transactions over one resource.
//
// Hashing policy: node hashes aggregate additively. A node's stored hash is
// its local content hash plus, for every descendant, that descendant's
// local hash scaled by a prime. Insertions and removals therefore adjust
// all ancestors by the same wrapping delta, which keeps rolling maintenance
// O(depth) per change.

use std::sync::Arc;

use parking_lot::ReentrantMutexGuard;
use tracing::{debug, warn};

use crate::config::HashKind;
use crate::error::{DbError, Result};
use crate::node::{Node, NodeKind, DOCUMENT_ROOT_KEY};
use crate::page::{PageReadTrx, PageWriteTrx};
use crate::trx::{ResourceSession, Session};

const HASH_PRIME: u64 = 0x9e37_79b9_7f4a_7c15;

fn scaled(hash: u64) -> u64 {
    hash.wrapping_mul(HASH_PRIME)
}

/// Read-only transaction over one committed revision.
pub struct NodeReadTrx<'a> {
    session: &'a ResourceSession,
    page: Option<PageReadTrx>,
}

impl<'a> NodeReadTrx<'a> {
    pub(crate) fn new(session: &'a ResourceSession, page: PageReadTrx) -> Self {
        Self {
            session,
            page: Some(page),
        }
    }

    fn page(&self) -> &PageReadTrx {
        self.page.as_ref().expect("page trx present until drop")
    }

    pub fn revision_number(&self) -> u64 {
        self.page().revision()
    }

    /// Commit timestamp of this revision, unix milliseconds UTC.
    pub fn commit_timestamp(&self) -> u64 {
        self.page().revision_root().commit_timestamp
    }

    pub fn author(&self) -> &str {
        &self.page().revision_root().author
    }

    pub fn commit_message(&self) -> Option<&str> {
        self.page().revision_root().commit_message.as_deref()
    }

    pub fn max_node_key(&self) -> u64 {
        self.page().revision_root().max_node_key
    }

    pub fn get_node(&self, node_key: u64) -> Result<Option<Arc<Node>>> {
        self.page().get_node(node_key)
    }

    pub fn has_node(&self, node_key: u64) -> Result<bool> {
        Ok(self.get_node(node_key)?.is_some())
    }

    pub fn document_node(&self) -> Result<Arc<Node>> {
        self.get_node(DOCUMENT_ROOT_KEY)?.ok_or_else(|| {
            DbError::Storage("revision has no document root".to_string())
        })
    }

    /// Children of `node_key` in sibling order.
    pub fn children_of(&self, node_key: u64) -> Result<Vec<Arc<Node>>> {
        let Some(node) = self.get_node(node_key)? else {
            return Ok(Vec::new());
        };
        let Some(struct_delegate) = &node.struct_delegate else {
            return Ok(Vec::new());
        };

        let mut children = Vec::with_capacity(struct_delegate.child_count as usize);
        let mut next = struct_delegate.first_child_key;
        while next != crate::node::NULL_NODE_KEY {
            let child = self.get_node(next)?.ok_or_else(|| {
                DbError::Storage(format!("dangling child link to node {next}"))
            })?;
            next = child
                .struct_delegate
                .as_ref()
                .map(|s| s.right_sibling_key)
                .unwrap_or(crate::node::NULL_NODE_KEY);
            children.push(child);
        }
        Ok(children)
    }
}

impl Drop for NodeReadTrx<'_> {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            self.session.release_read_trx(page);
        }
    }
}

/// The single write transaction of a resource.
///
/// Holds the resource's write lock for its whole lifetime; dropping an
/// uncommitted transaction aborts it.
pub struct NodeWriteTrx<'a> {
    session: &'a ResourceSession,
    _guard: ReentrantMutexGuard<'a, ()>,
    page: Option<PageWriteTrx>,
}

impl<'a> NodeWriteTrx<'a> {
    pub(crate) fn new(
        session: &'a ResourceSession,
        guard: ReentrantMutexGuard<'a, ()>,
        page: PageWriteTrx,
    ) -> Self {
        Self {
            session,
            _guard: guard,
            page: Some(page),
        }
    }

    fn page_mut(&mut self) -> &mut PageWriteTrx {
        self.page.as_mut().expect("page trx present until commit")
    }

    fn page_ref(&self) -> &PageWriteTrx {
        self.page.as_ref().expect("page trx present until commit")
    }

    fn hash_kind(&self) -> HashKind {
        self.session.config().hash_kind
    }

    /// Revision this transaction will publish on commit.
    pub fn revision_number(&self) -> u64 {
        self.page_ref().new_revision()
    }

    pub fn get_node(&self, node_key: u64) -> Result<Option<Node>> {
        self.page_ref().get_node(node_key)
    }

    /// Inserts a new node as the last child of `parent_key` and returns
    /// its key.
    pub fn insert_child(
        &mut self,
        parent_key: u64,
        kind: NodeKind,
        value: Option<Vec<u8>>,
    ) -> Result<u64> {
        if kind.is_document_root() {
            return Err(DbError::Usage(
                "document roots exist only at bootstrap".to_string(),
            ));
        }
        let rolling = self.hash_kind() == HashKind::Rolling;
        let page = self.page_mut();

        let mut parent = page
            .get_node(parent_key)?
            .ok_or_else(|| DbError::Usage(format!("no node with key {parent_key}")))?;
        let parent_struct = parent.struct_delegate.as_mut().ok_or_else(|| {
            DbError::Usage(format!("node {parent_key} cannot have children"))
        })?;

        let node_key = page.assign_node_key();
        let dewey_id = parent
            .delegate
            .dewey_id
            .as_ref()
            .map(|d| d.child(parent_struct.child_count as u32 + 1));
        let mut node = Node::new(kind, node_key, parent_key, dewey_id, value);
        node.delegate.hash = node.local_hash();
        let contribution = scaled(node.local_hash());

        if parent_struct.has_first_child() {
            let last_key = parent_struct.last_child_key;
            let mut last = page.get_node(last_key)?.ok_or_else(|| {
                DbError::Storage(format!("dangling last-child link to node {last_key}"))
            })?;
            if let Some(s) = last.struct_delegate.as_mut() {
                s.right_sibling_key = node_key;
            }
            if let Some(s) = node.struct_delegate.as_mut() {
                s.left_sibling_key = last_key;
            }
            page.put_node(last)?;
            parent_struct.last_child_key = node_key;
        } else {
            parent_struct.first_child_key = node_key;
            parent_struct.last_child_key = node_key;
        }
        parent_struct.child_count += 1;
        parent_struct.descendant_count += 1;
        if rolling {
            parent.delegate.hash = parent.delegate.hash.wrapping_add(contribution);
        }
        let mut ancestor_key = parent.parent_key();
        let mut ancestor_live = parent.delegate.has_parent();
        page.put_node(parent)?;
        page.put_node(node)?;

        while ancestor_live {
            let mut ancestor = page.get_node(ancestor_key)?.ok_or_else(|| {
                DbError::Storage(format!("dangling parent link to node {ancestor_key}"))
            })?;
            if let Some(s) = ancestor.struct_delegate.as_mut() {
                s.descendant_count += 1;
            }
            if rolling {
                ancestor.delegate.hash = ancestor.delegate.hash.wrapping_add(contribution);
            }
            ancestor_live = ancestor.delegate.has_parent();
            let next = ancestor.parent_key();
            page.put_node(ancestor)?;
            ancestor_key = next;
        }

        Ok(node_key)
    }

    /// Replaces the value bytes of `node_key`.
    pub fn set_value(&mut self, node_key: u64, value: Vec<u8>) -> Result<()> {
        let rolling = self.hash_kind() == HashKind::Rolling;
        let page = self.page_mut();

        let mut node = page
            .get_node(node_key)?
            .ok_or_else(|| DbError::Usage(format!("no node with key {node_key}")))?;
        let old_local = node.local_hash();
        node.value = Some(value);
        let new_local = node.local_hash();

        if rolling {
            let delta = new_local.wrapping_sub(old_local);
            node.delegate.hash = node.delegate.hash.wrapping_add(delta);
            let scaled_delta = scaled(new_local).wrapping_sub(scaled(old_local));

            let mut ancestor_key = node.parent_key();
            let mut ancestor_live = node.delegate.has_parent();
            page.put_node(node)?;
            while ancestor_live {
                let mut ancestor = page.get_node(ancestor_key)?.ok_or_else(|| {
                    DbError::Storage(format!("dangling parent link to node {ancestor_key}"))
                })?;
                ancestor.delegate.hash = ancestor.delegate.hash.wrapping_add(scaled_delta);
                ancestor_live = ancestor.delegate.has_parent();
                let next = ancestor.parent_key();
                page.put_node(ancestor)?;
                ancestor_key = next;
            }
        } else {
            page.put_node(node)?;
        }
        Ok(())
    }

    /// Removes `node_key` and its whole subtree.
    pub fn remove_node(&mut self, node_key: u64) -> Result<()> {
        if node_key == DOCUMENT_ROOT_KEY {
            return Err(DbError::Usage(
                "the document root cannot be removed".to_string(),
            ));
        }
        let rolling = self.hash_kind() == HashKind::Rolling;
        let page = self.page_mut();

        let node = page
            .get_node(node_key)?
            .ok_or_else(|| DbError::Usage(format!("no node with key {node_key}")))?;

        // Collect the subtree depth-first before touching any link.
        let mut subtree = Vec::new();
        let mut stack = vec![node.clone()];
        while let Some(current) = stack.pop() {
            if let Some(s) = &current.struct_delegate {
                let mut next = s.first_child_key;
                while next != crate::node::NULL_NODE_KEY {
                    let child = page.get_node(next)?.ok_or_else(|| {
                        DbError::Storage(format!("dangling child link to node {next}"))
                    })?;
                    next = child
                        .struct_delegate
                        .as_ref()
                        .map(|c| c.right_sibling_key)
                        .unwrap_or(crate::node::NULL_NODE_KEY);
                    stack.push(child);
                }
            }
            subtree.push(current);
        }
        let removed_count = subtree.len() as u64;
        let removed_contribution: u64 = subtree
            .iter()
            .fold(0u64, |acc, n| acc.wrapping_add(scaled(n.local_hash())));

        // Unlink from the sibling axis.
        let (left_key, right_key) = node
            .struct_delegate
            .as_ref()
            .map(|s| (s.left_sibling_key, s.right_sibling_key))
            .unwrap_or((crate::node::NULL_NODE_KEY, crate::node::NULL_NODE_KEY));
        if left_key != crate::node::NULL_NODE_KEY {
            if let Some(mut left) = page.get_node(left_key)? {
                if let Some(s) = left.struct_delegate.as_mut() {
                    s.right_sibling_key = right_key;
                }
                page.put_node(left)?;
            }
        }
        if right_key != crate::node::NULL_NODE_KEY {
            if let Some(mut right) = page.get_node(right_key)? {
                if let Some(s) = right.struct_delegate.as_mut() {
                    s.left_sibling_key = left_key;
                }
                page.put_node(right)?;
            }
        }

        // Parent bookkeeping.
        let parent_key = node.parent_key();
        let mut parent = page.get_node(parent_key)?.ok_or_else(|| {
            DbError::Storage(format!("dangling parent link to node {parent_key}"))
        })?;
        if let Some(s) = parent.struct_delegate.as_mut() {
            if s.first_child_key == node_key {
                s.first_child_key = right_key;
            }
            if s.last_child_key == node_key {
                s.last_child_key = left_key;
            }
            s.child_count -= 1;
            s.descendant_count -= removed_count;
        }
        if rolling {
            parent.delegate.hash = parent.delegate.hash.wrapping_sub(removed_contribution);
        }
        let mut ancestor_key = parent.parent_key();
        let mut ancestor_live = parent.delegate.has_parent();
        page.put_node(parent)?;

        while ancestor_live {
            let mut ancestor = page.get_node(ancestor_key)?.ok_or_else(|| {
                DbError::Storage(format!("dangling parent link to node {ancestor_key}"))
            })?;
            if let Some(s) = ancestor.struct_delegate.as_mut() {
                s.descendant_count -= removed_count;
            }
            if rolling {
                ancestor.delegate.hash =
                    ancestor.delegate.hash.wrapping_sub(removed_contribution);
            }
            ancestor_live = ancestor.delegate.has_parent();
            let next = ancestor.parent_key();
            page.put_node(ancestor)?;
            ancestor_key = next;
        }

        for doomed in subtree {
            page.remove_node(doomed.node_key())?;
        }
        Ok(())
    }

    /// Commits with the default timestamp policy and no message.
    pub fn commit(self) -> Result<u64> {
        self.commit_with(None, None)
    }

    /// Commits, optionally attaching a message and (for resources with
    /// custom commit timestamps) an explicit timestamp.
    ///
    /// # Errors
    ///
    /// `Usage` when a timestamp is supplied but the resource was not
    /// created with custom commit timestamps.
    pub fn commit_with(
        mut self,
        commit_message: Option<String>,
        commit_timestamp: Option<u64>,
    ) -> Result<u64> {
        let config = self.session.config();
        if commit_timestamp.is_some() && !config.custom_commit_timestamps {
            return Err(DbError::Usage(
                "resource does not allow custom commit timestamps".to_string(),
            ));
        }

        let mut page = self.page.take().expect("page trx present until commit");
        if self.hash_kind() == HashKind::Postorder {
            recompute_postorder_hashes(&mut page)?;
        }

        let now = chrono::Utc::now().timestamp_millis() as u64;
        let timestamp = if config.custom_commit_timestamps {
            if page.new_revision() == 0 {
                // Deterministic bootstrap revision.
                0
            } else {
                commit_timestamp.unwrap_or(now)
            }
        } else {
            now
        };

        let uber = self.session.uber_snapshot();
        let swung = page.commit(
            &uber,
            &config.path,
            self.session.user().name.clone(),
            commit_message,
            timestamp,
        )?;
        let revision = swung.latest_revision();
        self.session.publish_uber(swung);
        if let Err(e) = self.session.prime_page_trx_pool() {
            warn!(error = %e, "could not re-prime the page transaction pool");
        }
        Ok(revision)
    }

    /// Drops every uncommitted change and releases the write lock.
    pub fn abort(mut self) {
        if let Some(page) = self.page.take() {
            page.abort();
        }
    }
}

impl Drop for NodeWriteTrx<'_> {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            debug!("aborting uncommitted write transaction");
            page.abort();
        }
    }
}

/// Recomputes every hash bottom-up; used by the postorder policy at commit.
fn recompute_postorder_hashes(page: &mut PageWriteTrx) -> Result<()> {
    fn walk(page: &mut PageWriteTrx, node_key: u64) -> Result<u64> {
        let node = page
            .get_node(node_key)?
            .ok_or_else(|| DbError::Storage(format!("dangling link to node {node_key}")))?;
        let mut hash = node.local_hash();
        if let Some(s) = &node.struct_delegate {
            let mut next = s.first_child_key;
            while next != crate::node::NULL_NODE_KEY {
                let child_hash = walk(page, next)?;
                hash = hash.wrapping_add(scaled(child_hash));
                next = page
                    .get_node(next)?
                    .and_then(|c| c.struct_delegate.as_ref().map(|s| s.right_sibling_key))
                    .unwrap_or(crate::node::NULL_NODE_KEY);
            }
        }
        let mut node = node;
        node.delegate.hash = hash;
        page.put_node(node)?;
        Ok(hash)
    }

    walk(page, DOCUMENT_ROOT_KEY).map(|_| ())
}
