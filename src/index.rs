//! The structural index: byte ranges of every value in a JSON document.
//!
//! The index is stored flat. Containers live in `nodes` in preorder (the root container, if
//! any, is node 0), and the children of every container occupy one contiguous run of
//! `entries`. Object keys are deduplicated into a key table and referenced by [`KeyId`].
//!
//! ```text
//! StructuralIndex
//! ├── root: ChildRef
//! ├── nodes: Vec<Node>      # span, kind, (children_start, children_len)
//! ├── entries: Vec<Entry>   # optional key + ChildRef, grouped per node
//! └── keys: IndexSet<String>
//! ```

use std::fmt;
use std::time::SystemTime;

use indexmap::IndexSet;
use rustc_hash::{FxBuildHasher, FxHashMap};

/// A half-open byte range `[offset, offset + length)` in the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub offset: u64,
    pub length: u64,
}

impl Span {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// The exclusive end offset.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Object,
    Array,
}

/// Type hint for a value that was not decomposed further.
///
/// `Object` and `Array` only occur for containers nested deeper than the configured indexing
/// depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeafKind {
    String,
    Number,
    Bool,
    Null,
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeafDescriptor {
    pub span: Span,
    pub kind: LeafKind,
}

/// Preorder id of a container node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Id of an object key in the key table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub u32);

impl KeyId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Reference from a parent to one of its children (or from the index to its root value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildRef {
    Node(NodeId),
    Leaf(LeafDescriptor),
}

/// An indexed object or array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub span: Span,
    pub kind: ContainerKind,
    pub(crate) children_start: u32,
    pub(crate) children_len: u32,
    pub(crate) has_duplicate_keys: bool,
}

impl Node {
    pub(crate) fn new(span: Span, kind: ContainerKind, children_start: u32, children_len: u32) -> Self {
        Self {
            span,
            kind,
            children_start,
            children_len,
            has_duplicate_keys: false,
        }
    }

    /// Whether this object contained the same key more than once.
    pub fn has_duplicate_keys(&self) -> bool {
        self.has_duplicate_keys
    }
}

/// One child of a container. Object entries have a key, array entries don't.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub key: Option<KeyId>,
    pub value: ChildRef,
}

pub(crate) type KeyTable = IndexSet<String, FxBuildHasher>;

/// The structural index of one JSON document.
pub struct StructuralIndex {
    root: ChildRef,
    nodes: Vec<Node>,
    entries: Vec<Entry>,
    keys: KeyTable,
    max_depth: Option<u32>,
    /// Position in `entries` of the last occurrence of each key, per object.
    lookup: FxHashMap<(NodeId, KeyId), u32>,
}

impl StructuralIndex {
    /// Assembles an index and derives its key lookup table.
    pub(crate) fn from_parts(
        root: ChildRef,
        mut nodes: Vec<Node>,
        entries: Vec<Entry>,
        keys: KeyTable,
        max_depth: Option<u32>,
    ) -> Self {
        let mut lookup = FxHashMap::default();
        for (id, node) in nodes.iter_mut().enumerate() {
            if node.kind != ContainerKind::Object {
                continue;
            }
            let start = node.children_start as usize;
            let end = start.saturating_add(node.children_len as usize);
            // Out-of-bounds ranges are reported by `validate`.
            let Some(children) = entries.get(start..end) else {
                continue;
            };
            for (pos, entry) in children.iter().enumerate() {
                if let Some(key) = entry.key {
                    let pos = (start + pos) as u32;
                    if lookup.insert((NodeId(id as u32), key), pos).is_some() {
                        node.has_duplicate_keys = true;
                    }
                }
            }
        }
        Self {
            root,
            nodes,
            entries,
            keys,
            max_depth,
            lookup,
        }
    }

    pub fn root(&self) -> ChildRef {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// All entries of a container in document order, duplicates included.
    pub fn children(&self, id: NodeId) -> &[Entry] {
        match self.node(id) {
            Some(node) => {
                let start = node.children_start as usize;
                self.entries
                    .get(start..start.saturating_add(node.children_len as usize))
                    .unwrap_or(&[])
            }
            None => &[],
        }
    }

    /// Looks up a key in an object. With duplicate keys, the last occurrence wins.
    pub fn get_key(&self, id: NodeId, key: &str) -> Option<&Entry> {
        let key_id = self.key_id(key)?;
        let pos = *self.lookup.get(&(id, key_id))?;
        self.entries.get(pos as usize)
    }

    /// Looks up an element of an array.
    pub fn get_index(&self, id: NodeId, index: usize) -> Option<&Entry> {
        match self.node(id) {
            Some(node) if node.kind == ContainerKind::Array => self.children(id).get(index),
            _ => None,
        }
    }

    /// Whether the entry at `pos` within the children of `id` is the one a lookup of its key
    /// resolves to. Always true for array elements.
    pub fn is_effective_entry(&self, id: NodeId, pos: usize) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        let Some(entry) = self.children(id).get(pos) else {
            return false;
        };
        match entry.key {
            Some(key) if node.has_duplicate_keys => {
                self.lookup.get(&(id, key)).copied()
                    == Some(node.children_start + pos as u32)
            }
            _ => true,
        }
    }

    /// Number of distinct keys of an object, or number of elements of an array.
    pub fn len(&self, id: NodeId) -> usize {
        match self.node(id) {
            Some(node) if node.has_duplicate_keys => (0..node.children_len as usize)
                .filter(|&pos| self.is_effective_entry(id, pos))
                .count(),
            Some(node) => node.children_len as usize,
            None => 0,
        }
    }

    pub fn key(&self, id: KeyId) -> Option<&str> {
        self.keys.get_index(id.index()).map(String::as_str)
    }

    pub fn key_id(&self, key: &str) -> Option<KeyId> {
        self.keys.get_index_of(key).map(|i| KeyId(i as u32))
    }

    /// The span of a child reference.
    pub fn span_of(&self, child: ChildRef) -> Option<Span> {
        match child {
            ChildRef::Node(id) => self.node(id).map(|node| node.span),
            ChildRef::Leaf(leaf) => Some(leaf.span),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Containers nested deeper than this were stored as leaves. `None` means full depth.
    pub fn max_depth(&self) -> Option<u32> {
        self.max_depth
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Checks the structural invariants: every reference resolves, sibling ranges are strictly
    /// increasing and disjoint, every child lies strictly inside its parent, and (if
    /// `source_len` is given) the root lies inside the source.
    pub fn validate(&self, source_len: Option<u64>) -> Result<(), String> {
        let root_span = self
            .span_of(self.root)
            .ok_or_else(|| format!("root refers to missing {:?}", self.root))?;
        if root_span.length == 0 {
            return Err("root value has an empty span".into());
        }
        if let Some(len) = source_len {
            if root_span.end() > len {
                return Err(format!(
                    "root span {root_span:?} exceeds the source length {len}"
                ));
            }
        }
        if let ChildRef::Node(id) = self.root {
            if id.0 != 0 {
                return Err(format!("root node must be node 0, found {}", id.0));
            }
        }

        for (index, node) in self.nodes.iter().enumerate() {
            let id = NodeId(index as u32);
            let start = node.children_start as usize;
            let end = start
                .checked_add(node.children_len as usize)
                .filter(|&end| end <= self.entries.len())
                .ok_or_else(|| format!("children of node {index} are out of bounds"))?;

            let mut previous_end = node.span.offset + 1;
            for entry in &self.entries[start..end] {
                match (node.kind, entry.key) {
                    (ContainerKind::Object, Some(key)) if key.index() < self.keys.len() => {}
                    (ContainerKind::Array, None) => {}
                    _ => return Err(format!("node {index} has a mismatched entry key")),
                }
                if let ChildRef::Node(child) = entry.value {
                    // Preorder ids rule out cycles.
                    if child <= id {
                        return Err(format!("node {index} refers back to node {}", child.0));
                    }
                }
                let span = self
                    .span_of(entry.value)
                    .ok_or_else(|| format!("node {index} refers to a missing node"))?;
                if span.length == 0 || span.offset < previous_end {
                    return Err(format!("child {span:?} of node {index} overlaps its predecessor"));
                }
                previous_end = span.end();
            }
            if node.span.length < 2 || previous_end >= node.span.end() {
                return Err(format!("children of node {index} escape its span"));
            }
        }
        Ok(())
    }
}

impl PartialEq for StructuralIndex {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
            && self.nodes == other.nodes
            && self.entries == other.entries
            && self.max_depth == other.max_depth
            && self.keys.iter().eq(other.keys.iter())
    }
}

impl fmt::Debug for StructuralIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuralIndex")
            .field("root", &self.root)
            .field("nodes", &self.nodes.len())
            .field("entries", &self.entries.len())
            .field("keys", &self.keys.len())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

/// What the index was built from. Persisted next to the index itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    /// Canonical path of the source file.
    pub source_path: std::path::PathBuf,
    pub source_len: u64,
    pub source_modified: SystemTime,
    pub max_depth: Option<u32>,
    pub format_version: u16,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scanner::{scan, ScanOptions};

    fn index(s: &str) -> StructuralIndex {
        scan(s.as_bytes(), &ScanOptions::default()).unwrap()
    }

    fn root_node(index: &StructuralIndex) -> NodeId {
        match index.root() {
            ChildRef::Node(id) => id,
            other => panic!("expected a container root, got {other:?}"),
        }
    }

    #[test]
    fn test_lookup_last_wins() {
        let s = r#"{"k": 1, "x": true, "k": 22}"#;
        let index = index(s);
        let root = root_node(&index);
        assert!(index.node(root).unwrap().has_duplicate_keys());
        assert_eq!(index.children(root).len(), 3);
        assert_eq!(index.len(root), 2);

        let entry = index.get_key(root, "k").unwrap();
        assert_eq!(
            entry.value,
            ChildRef::Leaf(LeafDescriptor {
                span: Span::new(25, 2),
                kind: LeafKind::Number,
            })
        );
        assert!(!index.is_effective_entry(root, 0));
        assert!(index.is_effective_entry(root, 1));
        assert!(index.is_effective_entry(root, 2));
        assert!(index.get_key(root, "missing").is_none());
        assert!(index.get_index(root, 0).is_none());
    }

    #[test]
    fn test_validate_accepts_scanned_index() {
        let s = r#" {"a": [1, {"b": "x"}, 3], "c": {}, "d": []} "#;
        let index = index(s);
        assert_eq!(index.validate(Some(s.len() as u64)), Ok(()));
        assert!(index.validate(Some(10)).is_err());
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let mut keys = KeyTable::default();
        keys.insert("a".to_string());
        let leaf = |offset, length| {
            ChildRef::Leaf(LeafDescriptor {
                span: Span::new(offset, length),
                kind: LeafKind::Number,
            })
        };
        let nodes = vec![Node::new(Span::new(0, 10), ContainerKind::Array, 0, 2)];
        let entries = vec![
            Entry { key: None, value: leaf(1, 3) },
            Entry { key: None, value: leaf(3, 3) },
        ];
        let index =
            StructuralIndex::from_parts(ChildRef::Node(NodeId(0)), nodes, entries, keys, None);
        assert!(index.validate(None).is_err());
    }
}
