// Copy-on-write page tree.
//
// Frames on disk are addressed by `PageReference`. A committed revision is
// one `RevisionRootPage` referencing the record pages of that revision;
// unchanged record pages keep the references of the previous revision. The
// `UberPage` lists every committed revision root and is atomically replaced
// (tmp file + fsync + rename) to publish a commit; a revision exists iff
// the swung uber page references it.

pub mod trx;

pub use trx::{PageReadTrx, PageTrxPool, PageWriteTrx};

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::paths::{UBER_FILE, UBER_FILE_TMP};
use crate::error::{DbError, Result};
use crate::node::Node;

/// Record slots per record page; the page number of a node is
/// `node_key / RECORD_PAGE_FANOUT`.
pub const RECORD_PAGE_FANOUT: u64 = 512;

/// Location of a serialized frame in the resource's page file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageReference {
    pub offset: u64,
    pub length: u32,
    pub checksum: u32,
}

/// A slotted page of nodes, keyed by node key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPage {
    pub page_number: u64,
    pub records: BTreeMap<u64, Node>,
}

impl RecordPage {
    pub fn new(page_number: u64) -> Self {
        Self {
            page_number,
            records: BTreeMap::new(),
        }
    }

    pub fn get(&self, node_key: u64) -> Option<&Node> {
        self.records.get(&node_key)
    }

    pub fn put(&mut self, node: Node) {
        self.records.insert(node.node_key(), node);
    }

    pub fn remove(&mut self, node_key: u64) -> Option<Node> {
        self.records.remove(&node_key)
    }

    pub fn page_number_of(node_key: u64) -> u64 {
        node_key / RECORD_PAGE_FANOUT
    }
}

/// Root page of one committed revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRootPage {
    pub revision: u64,
    /// Commit timestamp, unix milliseconds UTC.
    pub commit_timestamp: u64,
    pub max_node_key: u64,
    pub author: String,
    pub commit_message: Option<String>,
    /// Record-page number to frame reference; shared entries point into
    /// older revisions' frames.
    pub record_page_refs: BTreeMap<u64, PageReference>,
}

impl RevisionRootPage {
    /// Root of the initial empty revision.
    pub fn bootstrap(commit_timestamp: u64, author: String) -> Self {
        Self {
            revision: 0,
            commit_timestamp,
            max_node_key: 0,
            author,
            commit_message: None,
            record_page_refs: BTreeMap::new(),
        }
    }
}

/// Anchor of the page tree: one reference per committed revision root,
/// indexed by revision number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UberPage {
    pub revision_roots: Vec<PageReference>,
}

impl UberPage {
    pub fn empty() -> Self {
        Self {
            revision_roots: Vec::new(),
        }
    }

    pub fn revision_count(&self) -> u64 {
        self.revision_roots.len() as u64
    }

    /// Number of the most recent committed revision; 0 when nothing has
    /// been committed yet.
    pub fn latest_revision(&self) -> u64 {
        self.revision_count().saturating_sub(1)
    }

    pub fn reference_for(&self, revision: u64) -> Option<PageReference> {
        self.revision_roots.get(revision as usize).copied()
    }

    /// Reads the uber file under `data_dir`; `None` for a resource that has
    /// never committed.
    pub fn load(data_dir: &Path) -> Result<Option<UberPage>> {
        let file = data_dir.join(UBER_FILE);
        if !file.exists() {
            return Ok(None);
        }
        let raw = fs::read(&file)?;
        if raw.len() < 4 {
            return Err(DbError::Storage(format!(
                "uber file {} is truncated",
                file.display()
            )));
        }
        let (crc_bytes, body) = raw.split_at(4);
        let stored = u32::from_le_bytes(crc_bytes.try_into().expect("4-byte split"));
        if crc32fast::hash(body) != stored {
            return Err(DbError::Storage(format!(
                "uber file {} failed its checksum",
                file.display()
            )));
        }
        let (uber, _) = bincode::serde::decode_from_slice(body, bincode::config::standard())?;
        Ok(Some(uber))
    }

    /// Atomically replaces the uber file: serialize to a temporary sibling,
    /// fsync, rename over the live file. Readers observe either the old or
    /// the new revision list, never a torn one.
    pub fn swing(&self, data_dir: &Path) -> Result<()> {
        let body = bincode::serde::encode_to_vec(self, bincode::config::standard())?;
        let crc = crc32fast::hash(&body);

        let tmp = data_dir.join(UBER_FILE_TMP);
        let live = data_dir.join(UBER_FILE);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&crc.to_le_bytes())?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &live)?;
        Ok(())
    }
}
