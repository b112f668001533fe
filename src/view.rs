//! Lazy, seek-based access to an indexed JSON document.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::index::{
    ChildRef, ContainerKind, IndexMetadata, LeafDescriptor, NodeId, Span, StructuralIndex,
};

/// Deepest container nesting that materializes; `serde_json` rejects anything deeper.
const MAX_NESTING: usize = 127;

/// One step of a path into a document: an object key or an array index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for Segment<'a> {
    fn from(key: &'a str) -> Self {
        Segment::Key(key)
    }
}

impl<'a> From<&'a String> for Segment<'a> {
    fn from(key: &'a String) -> Self {
        Segment::Key(key)
    }
}

impl From<usize> for Segment<'_> {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

impl fmt::Display for Segment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, "key {key:?}"),
            Segment::Index(index) => write!(f, "index {index}"),
        }
    }
}

/// Navigation shared by every kind of value in a [`LazyView`].
pub trait Navigate<'v> {
    fn get_key(&self, key: &str) -> Result<LazyValue<'v>>;

    fn get_index(&self, index: usize) -> Result<LazyValue<'v>>;

    /// Fully decodes this value, equal to what an eager parse of its bytes would produce.
    fn materialize(&self) -> Result<Arc<Value>>;

    fn get<'s>(&self, segment: impl Into<Segment<'s>>) -> Result<LazyValue<'v>>
    where
        Self: Sized,
    {
        match segment.into() {
            Segment::Key(key) => self.get_key(key),
            Segment::Index(index) => self.get_index(index),
        }
    }
}

/// A lazily decoded JSON document backed by a structural index.
///
/// Accessed values are read from the source file on demand and memoized for the lifetime of the
/// view, so a value never changes once it has been returned. Clones share the file handle and
/// the memo; separate [`crate::IndexCache::load`] calls give independent views.
#[derive(Clone)]
pub struct LazyView {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    /// Seek and read happen under this lock, since they share one cursor.
    file: Mutex<File>,
    index: StructuralIndex,
    metadata: IndexMetadata,
    /// Decoded values by the byte offset at which they start. Offsets identify values
    /// uniquely: no two values in a document start at the same byte.
    memo: Mutex<FxHashMap<u64, Arc<Value>>>,
}

impl LazyView {
    /// Wraps an open source file and the index built from it.
    pub fn new(
        file: File,
        path: impl Into<PathBuf>,
        index: StructuralIndex,
        metadata: IndexMetadata,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                file: Mutex::new(file),
                index,
                metadata,
                memo: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn index(&self) -> &StructuralIndex {
        &self.inner.index
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.inner.metadata
    }

    /// Number of decoded values held by the memo.
    pub fn memoized_count(&self) -> usize {
        self.memo().len()
    }

    pub fn root(&self) -> Result<LazyValue<'_>> {
        self.value_of(self.inner.index.root())
    }

    pub fn get<'s>(&self, segment: impl Into<Segment<'s>>) -> Result<LazyValue<'_>> {
        self.root()?.get(segment)
    }

    /// Resolves an RFC 6901 JSON pointer such as `/a/1/b`.
    pub fn pointer(&self, pointer: &str) -> Result<LazyValue<'_>> {
        self.root()?.pointer(pointer)
    }

    /// Decodes the whole document.
    pub fn materialize(&self) -> Result<Arc<Value>> {
        self.root()?.materialize()
    }

    fn memo(&self) -> std::sync::MutexGuard<'_, FxHashMap<u64, Arc<Value>>> {
        self.inner.memo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn memoized(&self, offset: u64) -> Option<Arc<Value>> {
        self.memo().get(&offset).cloned()
    }

    /// Stores a decoded value, keeping the existing one if another thread was first.
    fn memoize(&self, offset: u64, value: Value) -> Arc<Value> {
        self.memo()
            .entry(offset)
            .or_insert_with(|| Arc::new(value))
            .clone()
    }

    fn read_span(&self, span: Span) -> Result<Vec<u8>> {
        let len = usize::try_from(span.length).map_err(|_| {
            Error::source_unavailable(
                &self.inner.path,
                io::Error::new(io::ErrorKind::InvalidInput, "value too large to read"),
            )
        })?;
        let mut buf = vec![0; len];
        let mut file = self.inner.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start(span.offset))
            .and_then(|_| file.read_exact(&mut buf))
            .map_err(|e| Error::source_unavailable(&self.inner.path, e))?;
        Ok(buf)
    }

    fn value_of(&self, child: ChildRef) -> Result<LazyValue<'_>> {
        match child {
            ChildRef::Node(id) => {
                let node = self
                    .inner
                    .index
                    .node(id)
                    .ok_or_else(|| Error::out_of_range(format!("node {}", id.0)))?;
                Ok(match node.kind {
                    ContainerKind::Object => LazyValue::Object(ObjectView { view: self, node: id }),
                    ContainerKind::Array => LazyValue::Array(ArrayView { view: self, node: id }),
                })
            }
            ChildRef::Leaf(leaf) => self.decode_leaf(leaf).map(LazyValue::Leaf),
        }
    }

    fn decode_leaf(&self, leaf: LeafDescriptor) -> Result<Arc<Value>> {
        if let Some(value) = self.memoized(leaf.span.offset) {
            return Ok(value);
        }
        let bytes = self.read_span(leaf.span)?;
        let value = decode(&bytes, leaf.span.offset)?;
        Ok(self.memoize(leaf.span.offset, value))
    }

    /// Reads the container's bytes in one go and assembles its value from them.
    fn materialize_node(&self, id: NodeId) -> Result<Arc<Value>> {
        let span = self
            .inner
            .index
            .node(id)
            .map(|node| node.span)
            .ok_or_else(|| Error::out_of_range(format!("node {}", id.0)))?;
        if let Some(value) = self.memoized(span.offset) {
            return Ok(value);
        }
        let bytes = self.read_span(span)?;
        let value = self.assemble(ChildRef::Node(id), &bytes, span.offset, 1)?;
        Ok(self.memoize(span.offset, value))
    }

    /// Builds the value of `child` from `bytes`, which hold the source starting at `base`.
    /// `depth` is the nesting level of `child` within the value being materialized.
    ///
    /// Object members are inserted in document order with `Map::insert`, which gives the same
    /// key order and duplicate resolution as an eager parse. Nesting is capped at the same
    /// depth `serde_json` accepts.
    fn assemble(&self, child: ChildRef, bytes: &[u8], base: u64, depth: usize) -> Result<Value> {
        let index = &self.inner.index;
        let span = index
            .span_of(child)
            .ok_or_else(|| Error::out_of_range(format!("{child:?}")))?;
        match child {
            ChildRef::Leaf(_) => {
                // Containers are always reassembled so the nesting count stays exact.
                if let Some(value) = self.memoized(span.offset) {
                    return Ok(Value::clone(&value));
                }
                let start = (span.offset - base) as usize;
                let slice = bytes.get(start..start + span.length as usize).ok_or_else(|| {
                    Error::source_unavailable(
                        &self.inner.path,
                        io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("value at byte {} lies outside its container", span.offset),
                        ),
                    )
                })?;
                decode(slice, span.offset)
            }
            ChildRef::Node(_) if depth > MAX_NESTING => Err(Error::TooDeep {
                offset: span.offset,
                limit: MAX_NESTING,
            }),
            ChildRef::Node(id) => match index.node(id).map(|node| node.kind) {
                Some(ContainerKind::Object) => {
                    let mut map = Map::new();
                    for entry in index.children(id) {
                        let key = entry
                            .key
                            .and_then(|key| index.key(key))
                            .ok_or_else(|| Error::out_of_range(format!("key of {child:?}")))?;
                        let value = self.assemble(entry.value, bytes, base, depth + 1)?;
                        map.insert(key.to_owned(), value);
                    }
                    Ok(Value::Object(map))
                }
                Some(ContainerKind::Array) => index
                    .children(id)
                    .iter()
                    .map(|entry| self.assemble(entry.value, bytes, base, depth + 1))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array),
                None => Err(Error::out_of_range(format!("node {}", id.0))),
            },
        }
    }
}

fn decode(bytes: &[u8], offset: u64) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|source| Error::Decode { offset, source })
}

impl fmt::Debug for LazyView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyView")
            .field("path", &self.inner.path)
            .field("index", &self.inner.index)
            .field("memoized", &self.memoized_count())
            .finish()
    }
}

/// A value inside a [`LazyView`]: an indexed container, or a decoded leaf.
///
/// Containers beyond the indexing depth limit come back as decoded leaves too; navigating into
/// them works the same way.
#[derive(Debug, Clone)]
pub enum LazyValue<'v> {
    Object(ObjectView<'v>),
    Array(ArrayView<'v>),
    Leaf(Arc<Value>),
}

impl<'v> LazyValue<'v> {
    pub fn as_object(&self) -> Option<&ObjectView<'v>> {
        match self {
            LazyValue::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayView<'v>> {
        match self {
            LazyValue::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&Value> {
        match self {
            LazyValue::Leaf(value) => Some(value),
            _ => None,
        }
    }

    /// Number of members or elements, `None` for primitives.
    pub fn len(&self) -> Option<usize> {
        match self {
            LazyValue::Object(object) => Some(object.len()),
            LazyValue::Array(array) => Some(array.len()),
            LazyValue::Leaf(value) => match &**value {
                Value::Object(map) => Some(map.len()),
                Value::Array(elements) => Some(elements.len()),
                _ => None,
            },
        }
    }

    /// Resolves an RFC 6901 JSON pointer relative to this value.
    pub fn pointer(&self, pointer: &str) -> Result<LazyValue<'v>> {
        if pointer.is_empty() {
            return Ok(self.clone());
        }
        let Some(rest) = pointer.strip_prefix('/') else {
            return Err(Error::out_of_range(format!("pointer {pointer:?}")));
        };
        let mut current = self.clone();
        let mut remaining = Some(rest);
        while let Some(path) = remaining {
            if let LazyValue::Leaf(value) = &current {
                // The rest of the path lies inside one decoded value; only the target is copied.
                let suffix = &pointer[pointer.len() - path.len() - 1..];
                return value
                    .pointer(suffix)
                    .map(|target| LazyValue::Leaf(Arc::new(target.clone())))
                    .ok_or_else(|| Error::out_of_range(format!("pointer {suffix:?}")));
            }
            let (raw, next) = match path.split_once('/') {
                Some((raw, next)) => (raw, Some(next)),
                None => (path, None),
            };
            remaining = next;
            let token = raw.replace("~1", "/").replace("~0", "~");
            current = if matches!(current, LazyValue::Array(_)) {
                match parse_array_index(&token) {
                    Some(index) => current.get_index(index)?,
                    None => return Err(Error::out_of_range(Segment::Key(&token))),
                }
            } else {
                current.get_key(&token)?
            };
        }
        Ok(current)
    }
}

fn parse_array_index(token: &str) -> Option<usize> {
    if token.is_empty()
        || !token.bytes().all(|b| b.is_ascii_digit())
        || (token.len() > 1 && token.starts_with('0'))
    {
        return None;
    }
    token.parse().ok()
}

impl<'v> Navigate<'v> for LazyValue<'v> {
    fn get_key(&self, key: &str) -> Result<LazyValue<'v>> {
        match self {
            LazyValue::Object(object) => object.get_key(key),
            LazyValue::Array(array) => array.get_key(key),
            LazyValue::Leaf(value) => value
                .as_object()
                .and_then(|map| map.get(key))
                .map(|v| LazyValue::Leaf(Arc::new(v.clone())))
                .ok_or_else(|| Error::out_of_range(Segment::Key(key))),
        }
    }

    fn get_index(&self, index: usize) -> Result<LazyValue<'v>> {
        match self {
            LazyValue::Object(object) => object.get_index(index),
            LazyValue::Array(array) => array.get_index(index),
            LazyValue::Leaf(value) => value
                .as_array()
                .and_then(|elements| elements.get(index))
                .map(|v| LazyValue::Leaf(Arc::new(v.clone())))
                .ok_or_else(|| Error::out_of_range(Segment::Index(index))),
        }
    }

    fn materialize(&self) -> Result<Arc<Value>> {
        match self {
            LazyValue::Object(object) => object.materialize(),
            LazyValue::Array(array) => array.materialize(),
            LazyValue::Leaf(value) => Ok(value.clone()),
        }
    }
}

/// An indexed JSON object.
#[derive(Clone, Copy)]
pub struct ObjectView<'v> {
    view: &'v LazyView,
    node: NodeId,
}

impl<'v> ObjectView<'v> {
    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.view.index().len(self.node)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.view.index().get_key(self.node, key).is_some()
    }

    /// Distinct keys, in the order of their first occurrence.
    pub fn keys(&self) -> impl Iterator<Item = &'v str> + 'v {
        let index = self.view.index();
        let dedup = index
            .node(self.node)
            .is_some_and(|node| node.has_duplicate_keys());
        let mut seen = FxHashSet::default();
        index.children(self.node).iter().filter_map(move |entry| {
            let key = entry.key?;
            if dedup && !seen.insert(key) {
                return None;
            }
            index.key(key)
        })
    }

    /// Members in key order, each with the value a lookup of its key would return.
    pub fn iter(&self) -> impl Iterator<Item = Result<(&'v str, LazyValue<'v>)>> + 'v {
        let object = *self;
        self.keys()
            .map(move |key| object.get_key(key).map(|value| (key, value)))
    }
}

impl<'v> Navigate<'v> for ObjectView<'v> {
    fn get_key(&self, key: &str) -> Result<LazyValue<'v>> {
        let entry = self
            .view
            .index()
            .get_key(self.node, key)
            .ok_or_else(|| Error::out_of_range(Segment::Key(key)))?;
        self.view.value_of(entry.value)
    }

    fn get_index(&self, index: usize) -> Result<LazyValue<'v>> {
        Err(Error::out_of_range(Segment::Index(index)))
    }

    fn materialize(&self) -> Result<Arc<Value>> {
        self.view.materialize_node(self.node)
    }
}

impl fmt::Debug for ObjectView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectView")
            .field("node", &self.node)
            .field("len", &self.len())
            .finish()
    }
}

/// An indexed JSON array.
#[derive(Clone, Copy)]
pub struct ArrayView<'v> {
    view: &'v LazyView,
    node: NodeId,
}

impl<'v> ArrayView<'v> {
    pub fn len(&self) -> usize {
        self.view.index().len(self.node)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<LazyValue<'v>>> + 'v {
        let view = self.view;
        view.index()
            .children(self.node)
            .iter()
            .map(move |entry| view.value_of(entry.value))
    }
}

impl<'v> Navigate<'v> for ArrayView<'v> {
    fn get_key(&self, key: &str) -> Result<LazyValue<'v>> {
        Err(Error::out_of_range(Segment::Key(key)))
    }

    fn get_index(&self, index: usize) -> Result<LazyValue<'v>> {
        let entry = self
            .view
            .index()
            .get_index(self.node, index)
            .ok_or_else(|| Error::out_of_range(Segment::Index(index)))?;
        self.view.value_of(entry.value)
    }

    fn materialize(&self) -> Result<Arc<Value>> {
        self.view.materialize_node(self.node)
    }
}

impl fmt::Debug for ArrayView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayView")
            .field("node", &self.node)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;
    use std::time::SystemTime;

    use serde_json::json;

    use super::*;
    use crate::codec::FORMAT_VERSION;
    use crate::scanner::{scan, ScanOptions};

    /// A view over a temporary file, built without going through the cache.
    fn view_of(s: &str) -> (tempfile::NamedTempFile, LazyView) {
        view_with_depth(s, None)
    }

    fn view_with_depth(s: &str, max_depth: Option<u32>) -> (tempfile::NamedTempFile, LazyView) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(s.as_bytes()).unwrap();
        let index = scan(s.as_bytes(), &ScanOptions { max_depth }).unwrap();
        let metadata = IndexMetadata {
            source_path: file.path().to_owned(),
            source_len: s.len() as u64,
            source_modified: SystemTime::now(),
            max_depth,
            format_version: FORMAT_VERSION,
        };
        let view = LazyView::new(file.reopen().unwrap(), file.path(), index, metadata);
        (file, view)
    }

    #[test]
    fn test_navigation() {
        let (_file, view) = view_of(r#"{"a": [1, {"b": "x"}, 3]}"#);
        let b = view.get("a").unwrap().get(1usize).unwrap().get("b").unwrap();
        assert_eq!(b.as_leaf(), Some(&json!("x")));
        let a1 = view.get("a").unwrap().get(1usize).unwrap();
        assert_eq!(*a1.materialize().unwrap(), json!({"b": "x"}));
        assert_eq!(view.get("a").unwrap().len(), Some(3));
        assert_eq!(
            view.pointer("/a/2").unwrap().as_leaf(),
            Some(&json!(3))
        );
    }

    #[test]
    fn test_out_of_range() {
        let (_file, view) = view_of(r#"{"a": [1, 2], "s": "str"}"#);
        for result in [
            view.get("missing"),
            view.get(0usize),
            view.get("a").and_then(|a| a.get(2usize)),
            view.get("a").and_then(|a| a.get("0")),
            view.get("s").and_then(|s| s.get("x")),
            view.pointer("/a/01"),
            view.pointer("a"),
        ] {
            assert!(
                matches!(result, Err(Error::OutOfRange { .. })),
                "{result:?}"
            );
        }
    }

    #[test]
    fn test_memoization() {
        let (file, view) = view_of(r#"{"n": 12.5, "o": {"k": [true]}}"#);
        let first = view.get("n").unwrap();
        assert_eq!(view.memoized_count(), 1);

        // Overwrite the source in place: memoized values must not change.
        std::fs::write(file.path(), r#"{"n": 99.5, "o": {"k": [null]}}"#).unwrap();
        let second = view.get("n").unwrap();
        assert_eq!(first.as_leaf(), second.as_leaf());
        assert_eq!(second.as_leaf(), Some(&json!(12.5)));

        let o = view.get("o").unwrap();
        let first = o.materialize().unwrap();
        let second = o.materialize().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_materialize_matches_eager_parse() {
        let s = r#"
            {"z": 1, "a": [1.0, -0, 1e2, 12345678901234567890, "é\n"],
             "m": {"y": null, "x": {"deep": [[[]]]}}, "z": {"again": false}}
        "#;
        let (_file, view) = view_of(s);
        let eager: Value = serde_json::from_str(s).unwrap();
        assert_eq!(*view.materialize().unwrap(), eager);

        // Same key order, including where the duplicated "z" ends up.
        let keys: Vec<_> = view.root().unwrap().as_object().unwrap().keys().collect();
        let eager_keys: Vec<_> = eager.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, eager_keys);
    }

    #[test]
    fn test_duplicate_keys() {
        let (_file, view) = view_of(r#"{"k": 1, "k": 2}"#);
        assert_eq!(view.get("k").unwrap().as_leaf(), Some(&json!(2)));
        let root = view.root().unwrap();
        let object = root.as_object().unwrap();
        assert_eq!(object.len(), 1);
        let members: Vec<_> = object
            .iter()
            .map(|m| {
                let (k, v) = m.unwrap();
                (k, v.materialize().unwrap())
            })
            .collect();
        assert_eq!(members, vec![("k", Arc::new(json!(2)))]);
        assert_eq!(*view.materialize().unwrap(), json!({"k": 2}));
    }

    #[test]
    fn test_array_iteration() {
        let (_file, view) = view_of(r#"[{"a": 1}, 2, [3]]"#);
        let root = view.root().unwrap();
        let values: Vec<_> = root
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.unwrap().materialize().unwrap())
            .collect();
        assert_eq!(
            values,
            vec![Arc::new(json!({"a": 1})), Arc::new(json!(2)), Arc::new(json!([3]))]
        );
    }

    #[test]
    fn test_depth_limited_values_are_navigable() {
        let s = r#"{"a": {"b": [10, {"c": "deep"}]}}"#;
        let (_file, view) = view_with_depth(s, Some(1));
        let a = view.get("a").unwrap();
        assert!(a.as_leaf().is_some());
        assert_eq!(
            view.pointer("/a/b/1/c").unwrap().as_leaf(),
            Some(&json!("deep"))
        );
        assert_eq!(a.len(), Some(1));
        assert_eq!(
            *view.materialize().unwrap(),
            serde_json::from_str::<Value>(s).unwrap()
        );
    }

    #[test]
    fn test_pointer_escapes() {
        let (_file, view) = view_of(r#"{"a/b": {"m~n": [0, 1]}, "": 5}"#);
        assert_eq!(
            view.pointer("/a~1b/m~0n/1").unwrap().as_leaf(),
            Some(&json!(1))
        );
        assert_eq!(view.pointer("/").unwrap().as_leaf(), Some(&json!(5)));
        assert!(view.pointer("").unwrap().as_object().is_some());
    }

    #[test]
    fn test_nesting_limit_matches_eager_parse() {
        for depth in [MAX_NESTING, MAX_NESTING + 1, 200_000] {
            let s = format!("{}{}", "[".repeat(depth), "]".repeat(depth));
            let (_file, view) = view_of(&s);
            assert_eq!(view.index().node_count(), depth);
            let eager = serde_json::from_str::<Value>(&s);
            match view.materialize() {
                Ok(value) => assert_eq!(*value, eager.unwrap()),
                Err(Error::TooDeep { offset, limit }) => {
                    assert!(eager.is_err(), "depth {depth}");
                    assert_eq!(offset, MAX_NESTING as u64);
                    assert_eq!(limit, MAX_NESTING);
                }
                Err(e) => panic!("unexpected error at depth {depth}: {e}"),
            }
            // Navigation does not recurse, so the inner values stay reachable.
            let inner = view.pointer(&"/0".repeat(depth - 1)).unwrap();
            assert_eq!(*inner.materialize().unwrap(), json!([]));
        }
    }

    #[test]
    fn test_pointer_into_depth_limited_value() {
        let s = r#"{"a": {"b/c": [{"m~n": [5, 6]}, 7], "d": "e"}}"#;
        let (_file, view) = view_with_depth(s, Some(1));
        assert_eq!(
            view.pointer("/a/b~1c/0/m~0n/1").unwrap().as_leaf(),
            Some(&json!(6))
        );
        assert_eq!(
            view.get("a").unwrap().pointer("/d").unwrap().as_leaf(),
            Some(&json!("e"))
        );
        assert_eq!(view.pointer("/a").unwrap().len(), Some(2));
        for pointer in ["/a/x", "/a/b~1c/2", "/a/b~1c/01", "/a/d/0"] {
            assert!(
                matches!(view.pointer(pointer), Err(Error::OutOfRange { .. })),
                "{pointer}"
            );
        }
    }

    #[test]
    fn test_shared_view_across_threads() {
        let elements: Vec<String> = (0..200).map(|i| format!(r#"{{"i": {i}}}"#)).collect();
        let s = format!("[{}]", elements.join(","));
        let (_file, view) = view_of(&s);
        std::thread::scope(|scope| {
            for t in 0..4 {
                let view = &view;
                scope.spawn(move || {
                    for i in (0..200usize).rev().skip(t) {
                        let v = view.get(i).unwrap().get("i").unwrap();
                        assert_eq!(v.as_leaf(), Some(&json!(i)));
                    }
                });
            }
        });
    }
}
