// In-memory node model for the XML and JSON data models.
//
// Nodes are layered: every node carries a `NodeDelegate` (identity, parent,
// hash, optional DeweyID); nodes that can have children additionally carry a
// `StructNodeDelegate` (first/last child, siblings, counts). The page layer
// stores nodes opaquely, keyed by node key.

use serde::{Deserialize, Serialize};

/// Reserved node key of the document root.
pub const DOCUMENT_ROOT_KEY: u64 = 0;
/// Sentinel for "no node".
pub const NULL_NODE_KEY: u64 = u64::MAX;

/// Stable hierarchical node identifier, carried as an opaque byte string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeweyId(pub Vec<u8>);

impl DeweyId {
    /// The root DeweyID, a single division of 1.
    pub fn root() -> Self {
        DeweyId(1u32.to_le_bytes().to_vec())
    }

    /// Child division appended to this ID.
    pub fn child(&self, division: u32) -> Self {
        let mut bytes = self.0.clone();
        bytes.extend_from_slice(&division.to_le_bytes());
        DeweyId(bytes)
    }

    /// Tree depth encoded by this ID (divisions are 4 bytes each).
    pub fn level(&self) -> usize {
        self.0.len() / 4
    }
}

/// Identity and ancestry of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDelegate {
    pub node_key: u64,
    pub parent_key: u64,
    pub hash: u64,
    pub dewey_id: Option<DeweyId>,
}

impl NodeDelegate {
    pub fn new(node_key: u64, parent_key: u64, dewey_id: Option<DeweyId>) -> Self {
        Self {
            node_key,
            parent_key,
            hash: 0,
            dewey_id,
        }
    }

    pub fn has_parent(&self) -> bool {
        self.parent_key != NULL_NODE_KEY
    }
}

/// Structure links of a node that can have children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructNodeDelegate {
    pub first_child_key: u64,
    pub last_child_key: u64,
    pub left_sibling_key: u64,
    pub right_sibling_key: u64,
    pub child_count: u64,
    pub descendant_count: u64,
}

impl StructNodeDelegate {
    pub fn empty() -> Self {
        Self {
            first_child_key: NULL_NODE_KEY,
            last_child_key: NULL_NODE_KEY,
            left_sibling_key: NULL_NODE_KEY,
            right_sibling_key: NULL_NODE_KEY,
            child_count: 0,
            descendant_count: 0,
        }
    }

    pub fn has_first_child(&self) -> bool {
        self.first_child_key != NULL_NODE_KEY
    }
}

/// Closed set of node kinds across both data models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    // Document roots
    XmlDocument,
    JsonDocument,
    // XML
    Element,
    Attribute,
    Text,
    // JSON
    Object,
    Array,
    ObjectKey,
    StringValue,
    NumberValue,
    BooleanValue,
    NullValue,
}

impl NodeKind {
    /// Kinds that carry a struct delegate. Everything except attributes
    /// participates in the sibling axis; value nodes simply never gain
    /// children.
    pub fn is_structural(self) -> bool {
        !matches!(self, NodeKind::Attribute)
    }

    pub fn is_document_root(self) -> bool {
        matches!(self, NodeKind::XmlDocument | NodeKind::JsonDocument)
    }
}

/// One tree node. Value bytes hold names for elements and object keys and
/// literal content for value nodes; structural nodes leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub delegate: NodeDelegate,
    pub struct_delegate: Option<StructNodeDelegate>,
    pub kind: NodeKind,
    pub value: Option<Vec<u8>>,
}

impl Node {
    pub fn new(
        kind: NodeKind,
        node_key: u64,
        parent_key: u64,
        dewey_id: Option<DeweyId>,
        value: Option<Vec<u8>>,
    ) -> Self {
        let struct_delegate = kind.is_structural().then(StructNodeDelegate::empty);
        Self {
            delegate: NodeDelegate::new(node_key, parent_key, dewey_id),
            struct_delegate,
            kind,
            value,
        }
    }

    /// The document root of an empty XML resource.
    pub fn xml_document_root(dewey_id: Option<DeweyId>) -> Self {
        Node::new(
            NodeKind::XmlDocument,
            DOCUMENT_ROOT_KEY,
            NULL_NODE_KEY,
            Some(dewey_id.unwrap_or_else(DeweyId::root)),
            None,
        )
    }

    /// The document root of an empty JSON resource.
    pub fn json_document_root(dewey_id: Option<DeweyId>) -> Self {
        Node::new(
            NodeKind::JsonDocument,
            DOCUMENT_ROOT_KEY,
            NULL_NODE_KEY,
            Some(dewey_id.unwrap_or_else(DeweyId::root)),
            None,
        )
    }

    pub fn node_key(&self) -> u64 {
        self.delegate.node_key
    }

    pub fn parent_key(&self) -> u64 {
        self.delegate.parent_key
    }

    /// Content hash of this node alone, independent of its subtree.
    ///
    /// FNV-1a over kind, key and value; ancestor aggregation is the write
    /// transaction's concern.
    pub fn local_hash(&self) -> u64 {
        const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut hash = FNV_OFFSET;
        let mut absorb = |byte: u8| {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        };
        absorb(self.kind as u8);
        for byte in self.delegate.node_key.to_le_bytes() {
            absorb(byte);
        }
        if let Some(value) = &self.value {
            for &byte in value {
                absorb(byte);
            }
        }
        hash
    }
}
