//! The offset scanner: one pass over a JSON byte stream, producing a [`StructuralIndex`].

use std::io::Read;

use json_session::{
    JsonParseError, JsonParseResult, JsonPrimitiveKind, JsonSession, JsonSessionEvent, Location,
};
use smallvec::SmallVec;
use tracing::debug;

use crate::error::ScanError;
use crate::index::{
    ChildRef, ContainerKind, Entry, KeyId, KeyTable, LeafDescriptor, LeafKind, Node, NodeId,
    Span, StructuralIndex,
};
use crate::reader::IoReadIterator;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Containers nested deeper than this are recorded as leaves. The root container has depth
    /// 1. `None` indexes the full depth.
    pub max_depth: Option<u32>,
}

/// Scans a whole JSON document from `reader`, which must be positioned at the start of the
/// document. Offsets in the index are relative to that position.
pub fn scan<R: Read>(reader: R, options: &ScanOptions) -> Result<StructuralIndex, ScanError> {
    let mut bytes = IoReadIterator::new(reader);
    let result = {
        let mut session = JsonSession::new(&mut bytes);
        let mut state = ScanState::new(options.max_depth);
        loop {
            match session.next() {
                Ok(Some(event)) => {
                    if let Err(e) = state.handle(event) {
                        break Err(e);
                    }
                }
                Ok(None) => break state.finish(),
                Err(e) => break Err(e),
            }
        }
    };
    // A failed read looks like EOF to the tokenizer, so check for it before trusting the
    // parse result.
    if let Some(source) = bytes.take_error() {
        return Err(ScanError::Io {
            offset: bytes.bytes_read(),
            source,
        });
    }
    let index = result?;
    debug!(
        nodes = index.node_count(),
        entries = index.entry_count(),
        keys = index.key_count(),
        bytes = bytes.bytes_read(),
        "scanned JSON document"
    );
    Ok(index)
}

struct Frame {
    node: NodeId,
    /// Where this container's children begin in `ScanState::pending`.
    pending_start: usize,
    pending_key: Option<KeyId>,
}

/// A container beyond the depth limit, which is skipped over and stored as one leaf.
struct Opaque {
    start: u64,
    kind: LeafKind,
    nesting: u32,
}

struct ScanState {
    stack: SmallVec<[Frame; 16]>,
    /// Children of all open containers. A container's children are moved to `entries` when it
    /// closes, which keeps every container's entries contiguous.
    pending: Vec<Entry>,
    nodes: Vec<Node>,
    entries: Vec<Entry>,
    keys: KeyTable,
    root: Option<ChildRef>,
    max_depth: Option<u32>,
    opaque: Option<Opaque>,
}

impl ScanState {
    fn new(max_depth: Option<u32>) -> Self {
        Self {
            stack: SmallVec::new(),
            pending: Vec::new(),
            nodes: Vec::new(),
            entries: Vec::new(),
            keys: KeyTable::default(),
            root: None,
            max_depth,
            opaque: None,
        }
    }

    fn put_value(&mut self, value: ChildRef) {
        match self.stack.last_mut() {
            None => self.root = Some(value),
            Some(frame) => self.pending.push(Entry {
                key: frame.pending_key.take(),
                value,
            }),
        }
    }

    fn begin_container(&mut self, kind: ContainerKind, start: Location) -> JsonParseResult<()> {
        if let Some(opaque) = &mut self.opaque {
            opaque.nesting += 1;
            return Ok(());
        }
        let depth = self.stack.len() as u32 + 1;
        if self.max_depth.is_some_and(|max| depth > max) {
            self.opaque = Some(Opaque {
                start: start.byte_offset,
                kind: match kind {
                    ContainerKind::Object => LeafKind::Object,
                    ContainerKind::Array => LeafKind::Array,
                },
                nesting: 1,
            });
            return Ok(());
        }

        let id = u32::try_from(self.nodes.len())
            .map_err(|_| JsonParseError::new("too many containers to index".into(), start))?;
        self.nodes
            .push(Node::new(Span::new(start.byte_offset, 0), kind, 0, 0));
        self.stack.push(Frame {
            node: NodeId(id),
            pending_start: self.pending.len(),
            pending_key: None,
        });
        Ok(())
    }

    fn end_container(&mut self, end: Location) -> JsonParseResult<()> {
        if let Some(opaque) = &mut self.opaque {
            opaque.nesting -= 1;
            if opaque.nesting == 0 {
                let leaf = LeafDescriptor {
                    span: Span::new(opaque.start, end.byte_offset - opaque.start),
                    kind: opaque.kind,
                };
                self.opaque = None;
                self.put_value(ChildRef::Leaf(leaf));
            }
            return Ok(());
        }

        let frame = self
            .stack
            .pop()
            .ok_or_else(|| JsonParseError::new("unbalanced container end".into(), end))?;
        let children_start = u32::try_from(self.entries.len())
            .map_err(|_| JsonParseError::new("too many values to index".into(), end))?;
        let children_len = (self.pending.len() - frame.pending_start) as u32;
        self.entries.extend(self.pending.drain(frame.pending_start..));

        let node = &mut self.nodes[frame.node.index()];
        node.span.length = end.byte_offset - node.span.offset;
        node.children_start = children_start;
        node.children_len = children_len;
        self.put_value(ChildRef::Node(frame.node));
        Ok(())
    }

    fn handle(&mut self, event: JsonSessionEvent) -> JsonParseResult<()> {
        match event {
            JsonSessionEvent::BeginObject {
                location_at_obj_start,
            } => self.begin_container(ContainerKind::Object, location_at_obj_start),
            JsonSessionEvent::BeginArray {
                location_at_array_start,
            } => self.begin_container(ContainerKind::Array, location_at_array_start),
            JsonSessionEvent::EndObject {
                location_after_obj_end,
            } => self.end_container(location_after_obj_end),
            JsonSessionEvent::EndArray {
                location_after_array_end,
            } => self.end_container(location_after_array_end),
            JsonSessionEvent::ObjectProperty { property_key, .. } => {
                if self.opaque.is_none() {
                    let (key, _) = self.keys.insert_full(property_key);
                    if let Some(frame) = self.stack.last_mut() {
                        frame.pending_key = Some(KeyId(key as u32));
                    }
                }
                Ok(())
            }
            JsonSessionEvent::PrimitiveValue {
                kind,
                location_at_value_start,
                location_after_value_end,
            } => {
                if self.opaque.is_none() {
                    let start = location_at_value_start.byte_offset;
                    let leaf = LeafDescriptor {
                        span: Span::new(start, location_after_value_end.byte_offset - start),
                        kind: match kind {
                            JsonPrimitiveKind::Number => LeafKind::Number,
                            JsonPrimitiveKind::Boolean => LeafKind::Bool,
                            JsonPrimitiveKind::String => LeafKind::String,
                            JsonPrimitiveKind::Null => LeafKind::Null,
                        },
                    };
                    self.put_value(ChildRef::Leaf(leaf));
                }
                Ok(())
            }
        }
    }

    fn finish(self) -> JsonParseResult<StructuralIndex> {
        let root = self.root.ok_or_else(|| {
            JsonParseError::new("document has no value".into(), Location::default())
        })?;
        Ok(StructuralIndex::from_parts(
            root,
            self.nodes,
            self.entries,
            self.keys,
            self.max_depth,
        ))
    }
}
