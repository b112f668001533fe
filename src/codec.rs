//! On-disk format of a structural index.
//!
//! All integers are little-endian. Every section is an array of fixed-width records, so a
//! node or entry can be located by id without decoding anything else.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ HEADER (72 bytes)                                        │
//! │   magic: [u8; 4] = "JIDX"                                │
//! │   version: u16                                           │
//! │   flags: u16 (bit 0: max_depth is set)                   │
//! │   max_depth: u32                                         │
//! │   source_len: u64                                        │
//! │   source_mtime_secs: i64 (relative to the Unix epoch)    │
//! │   source_mtime_nanos: u32                                │
//! │   path_len: u32                                          │
//! │   node_count, entry_count, key_count, key_bytes: u32     │
//! │   root: child record (20 bytes)                          │
//! ├──────────────────────────────────────────────────────────┤
//! │ SOURCE PATH [u8; path_len] (UTF-8)                       │
//! ├──────────────────────────────────────────────────────────┤
//! │ NODES, 28 bytes each                                     │
//! │   offset: u64, length: u64, kind: u8, reserved: [u8; 3]  │
//! │   children_start: u32, children_len: u32                 │
//! ├──────────────────────────────────────────────────────────┤
//! │ ENTRIES, 24 bytes each                                   │
//! │   key: u32 (u32::MAX for array elements)                 │
//! │   child record (20 bytes)                                │
//! ├──────────────────────────────────────────────────────────┤
//! │ KEY LENGTHS [u32; key_count], KEY BYTES [u8; key_bytes]  │
//! ├──────────────────────────────────────────────────────────┤
//! │ FOOTER: crc32 over everything above                      │
//! └──────────────────────────────────────────────────────────┘
//!
//! child record: tag: u8 (0 = node, 1 = leaf), leaf kind: u8, reserved: u16,
//!               node: id as u64, 0u64 / leaf: offset: u64, length: u64
//! ```

use std::io::Read;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crc32fast::Hasher as Crc32Hasher;

use crate::error::IndexFormatError;
use crate::index::{
    ChildRef, ContainerKind, Entry, IndexMetadata, KeyId, KeyTable, LeafDescriptor, LeafKind,
    Node, NodeId, Span, StructuralIndex,
};

pub const MAGIC: [u8; 4] = *b"JIDX";
pub const FORMAT_VERSION: u16 = 1;

const HEADER_SIZE: usize = 72;
const CHILD_RECORD_SIZE: usize = 20;
const NODE_RECORD_SIZE: usize = 28;
const ENTRY_RECORD_SIZE: usize = 4 + CHILD_RECORD_SIZE;
const FOOTER_SIZE: usize = 4;

const FLAG_HAS_MAX_DEPTH: u16 = 1;
const NO_KEY: u32 = u32::MAX;

/// Serializes an index and its metadata. `metadata.max_depth` must match the index.
pub fn encode(index: &StructuralIndex, metadata: &IndexMetadata) -> Vec<u8> {
    debug_assert_eq!(index.max_depth(), metadata.max_depth);

    let path = metadata.source_path.to_string_lossy();
    let key_bytes: usize = index.keys().map(str::len).sum();
    let capacity = HEADER_SIZE
        + path.len()
        + index.node_count() * NODE_RECORD_SIZE
        + index.entry_count() * ENTRY_RECORD_SIZE
        + index.key_count() * 4
        + key_bytes
        + FOOTER_SIZE;
    let mut buf = Vec::with_capacity(capacity);

    let (secs, nanos) = system_time_to_parts(metadata.source_modified);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    let flags = if metadata.max_depth.is_some() {
        FLAG_HAS_MAX_DEPTH
    } else {
        0
    };
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&metadata.max_depth.unwrap_or(0).to_le_bytes());
    buf.extend_from_slice(&metadata.source_len.to_le_bytes());
    buf.extend_from_slice(&secs.to_le_bytes());
    buf.extend_from_slice(&nanos.to_le_bytes());
    buf.extend_from_slice(&(path.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(index.node_count() as u32).to_le_bytes());
    buf.extend_from_slice(&(index.entry_count() as u32).to_le_bytes());
    buf.extend_from_slice(&(index.key_count() as u32).to_le_bytes());
    buf.extend_from_slice(&(key_bytes as u32).to_le_bytes());
    write_child(&mut buf, index.root());
    debug_assert_eq!(buf.len(), HEADER_SIZE);

    buf.extend_from_slice(path.as_bytes());

    for node in index.nodes() {
        buf.extend_from_slice(&node.span.offset.to_le_bytes());
        buf.extend_from_slice(&node.span.length.to_le_bytes());
        buf.push(match node.kind {
            ContainerKind::Object => 0,
            ContainerKind::Array => 1,
        });
        buf.extend_from_slice(&[0; 3]);
        buf.extend_from_slice(&node.children_start.to_le_bytes());
        buf.extend_from_slice(&node.children_len.to_le_bytes());
    }

    for entry in index.entries() {
        let key = entry.key.map_or(NO_KEY, |k| k.0);
        buf.extend_from_slice(&key.to_le_bytes());
        write_child(&mut buf, entry.value);
    }

    for key in index.keys() {
        buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    }
    for key in index.keys() {
        buf.extend_from_slice(key.as_bytes());
    }

    let mut hasher = Crc32Hasher::new();
    hasher.update(&buf);
    buf.extend_from_slice(&hasher.finalize().to_le_bytes());
    buf
}

/// Deserializes an index, verifying the version, the checksum, and the structural invariants.
pub fn decode(bytes: &[u8]) -> Result<(StructuralIndex, IndexMetadata), IndexFormatError> {
    let mut r = ByteReader::new(bytes);
    let header = Header::parse(&mut r)?;

    if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(IndexFormatError::Truncated);
    }
    let (content, footer) = bytes.split_at(bytes.len() - FOOTER_SIZE);
    let stored = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let mut hasher = Crc32Hasher::new();
    hasher.update(content);
    let computed = hasher.finalize();
    if stored != computed {
        return Err(IndexFormatError::ChecksumMismatch { stored, computed });
    }

    let expected_len = HEADER_SIZE as u64
        + header.path_len as u64
        + header.node_count as u64 * NODE_RECORD_SIZE as u64
        + header.entry_count as u64 * ENTRY_RECORD_SIZE as u64
        + header.key_count as u64 * 4
        + header.key_bytes as u64
        + FOOTER_SIZE as u64;
    if expected_len != bytes.len() as u64 {
        return Err(IndexFormatError::Corrupt(format!(
            "section sizes add up to {expected_len} bytes, file has {}",
            bytes.len()
        )));
    }

    let source_path = PathBuf::from(r.str(header.path_len as usize)?);

    let mut nodes = Vec::with_capacity(header.node_count as usize);
    for _ in 0..header.node_count {
        let span = Span::new(r.u64()?, r.u64()?);
        let kind = match r.u8()? {
            0 => ContainerKind::Object,
            1 => ContainerKind::Array,
            other => {
                return Err(IndexFormatError::Corrupt(format!(
                    "unknown container kind {other}"
                )))
            }
        };
        r.skip(3)?;
        let children_start = r.u32()?;
        let children_len = r.u32()?;
        nodes.push(Node::new(span, kind, children_start, children_len));
    }

    let mut entries = Vec::with_capacity(header.entry_count as usize);
    for _ in 0..header.entry_count {
        let key = match r.u32()? {
            NO_KEY => None,
            k => Some(KeyId(k)),
        };
        let value = read_child(&mut r)?;
        entries.push(Entry { key, value });
    }

    let mut key_lengths = Vec::with_capacity(header.key_count as usize);
    for _ in 0..header.key_count {
        key_lengths.push(r.u32()? as usize);
    }
    let mut keys = KeyTable::default();
    for len in key_lengths {
        let key = r.str(len)?;
        if !keys.insert(key.to_owned()) {
            return Err(IndexFormatError::Corrupt(format!(
                "key {key:?} appears twice in the key table"
            )));
        }
    }

    let index =
        StructuralIndex::from_parts(header.root, nodes, entries, keys, header.max_depth);
    index
        .validate(Some(header.source_len))
        .map_err(IndexFormatError::Corrupt)?;

    let metadata = header.into_metadata(source_path);
    Ok((index, metadata))
}

/// Reads only the header and source path. Cheap enough to run on every load.
///
/// The checksum is not verified here; [`decode`] does that.
pub fn read_metadata<R: Read>(mut reader: R) -> Result<IndexMetadata, IndexFormatError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    read_exact(&mut reader, &mut header_bytes)?;
    let header = Header::parse(&mut ByteReader::new(&header_bytes))?;
    let mut path = vec![0u8; header.path_len as usize];
    read_exact(&mut reader, &mut path)?;
    let path = String::from_utf8(path)
        .map_err(|_| IndexFormatError::Corrupt("source path is not UTF-8".into()))?;
    Ok(header.into_metadata(PathBuf::from(path)))
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), IndexFormatError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => IndexFormatError::Truncated,
        _ => IndexFormatError::Io(e),
    })
}

struct Header {
    max_depth: Option<u32>,
    source_len: u64,
    source_modified: SystemTime,
    path_len: u32,
    node_count: u32,
    entry_count: u32,
    key_count: u32,
    key_bytes: u32,
    root: ChildRef,
}

impl Header {
    fn parse(r: &mut ByteReader) -> Result<Self, IndexFormatError> {
        if r.bytes(4)? != MAGIC {
            return Err(IndexFormatError::BadMagic);
        }
        let version = r.u16()?;
        if version != FORMAT_VERSION {
            return Err(IndexFormatError::UnsupportedVersion {
                found: version,
                expected: FORMAT_VERSION,
            });
        }
        let flags = r.u16()?;
        let max_depth = r.u32()?;
        let source_len = r.u64()?;
        let secs = r.i64()?;
        let nanos = r.u32()?;
        if nanos >= 1_000_000_000 {
            return Err(IndexFormatError::Corrupt(format!(
                "invalid modification time nanoseconds {nanos}"
            )));
        }
        Ok(Header {
            max_depth: (flags & FLAG_HAS_MAX_DEPTH != 0).then_some(max_depth),
            source_len,
            source_modified: system_time_from_parts(secs, nanos),
            path_len: r.u32()?,
            node_count: r.u32()?,
            entry_count: r.u32()?,
            key_count: r.u32()?,
            key_bytes: r.u32()?,
            root: read_child(r)?,
        })
    }

    fn into_metadata(self, source_path: PathBuf) -> IndexMetadata {
        IndexMetadata {
            source_path,
            source_len: self.source_len,
            source_modified: self.source_modified,
            max_depth: self.max_depth,
            format_version: FORMAT_VERSION,
        }
    }
}

fn write_child(buf: &mut Vec<u8>, child: ChildRef) {
    match child {
        ChildRef::Node(id) => {
            buf.extend_from_slice(&[0, 0, 0, 0]);
            buf.extend_from_slice(&(id.0 as u64).to_le_bytes());
            buf.extend_from_slice(&0u64.to_le_bytes());
        }
        ChildRef::Leaf(leaf) => {
            let kind = match leaf.kind {
                LeafKind::String => 0,
                LeafKind::Number => 1,
                LeafKind::Bool => 2,
                LeafKind::Null => 3,
                LeafKind::Object => 4,
                LeafKind::Array => 5,
            };
            buf.extend_from_slice(&[1, kind, 0, 0]);
            buf.extend_from_slice(&leaf.span.offset.to_le_bytes());
            buf.extend_from_slice(&leaf.span.length.to_le_bytes());
        }
    }
}

fn read_child(r: &mut ByteReader) -> Result<ChildRef, IndexFormatError> {
    let tag = r.u8()?;
    let kind = r.u8()?;
    r.skip(2)?;
    let a = r.u64()?;
    let b = r.u64()?;
    match tag {
        0 => {
            let id = u32::try_from(a)
                .map_err(|_| IndexFormatError::Corrupt(format!("node id {a} out of range")))?;
            Ok(ChildRef::Node(NodeId(id)))
        }
        1 => {
            let kind = match kind {
                0 => LeafKind::String,
                1 => LeafKind::Number,
                2 => LeafKind::Bool,
                3 => LeafKind::Null,
                4 => LeafKind::Object,
                5 => LeafKind::Array,
                other => {
                    return Err(IndexFormatError::Corrupt(format!(
                        "unknown leaf kind {other}"
                    )))
                }
            };
            if a.checked_add(b).is_none() {
                return Err(IndexFormatError::Corrupt(format!(
                    "leaf span {a}+{b} overflows"
                )));
            }
            Ok(ChildRef::Leaf(LeafDescriptor {
                span: Span::new(a, b),
                kind,
            }))
        }
        other => Err(IndexFormatError::Corrupt(format!(
            "unknown child tag {other}"
        ))),
    }
}

fn system_time_to_parts(t: SystemTime) -> (i64, u32) {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos()),
        Err(e) => {
            // Before the epoch: store floor(seconds) and a non-negative nanosecond part.
            let d = e.duration();
            let mut secs = -(d.as_secs() as i64);
            let mut nanos = d.subsec_nanos();
            if nanos > 0 {
                secs -= 1;
                nanos = 1_000_000_000 - nanos;
            }
            (secs, nanos)
        }
    }
}

fn system_time_from_parts(secs: i64, nanos: u32) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + Duration::from_nanos(nanos as u64)
    }
}

/// Bounds-checked little-endian reader over a byte slice.
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], IndexFormatError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(IndexFormatError::Truncated)?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], IndexFormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn skip(&mut self, len: usize) -> Result<(), IndexFormatError> {
        self.bytes(len).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, IndexFormatError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, IndexFormatError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, IndexFormatError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, IndexFormatError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, IndexFormatError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn str(&mut self, len: usize) -> Result<&'a str, IndexFormatError> {
        std::str::from_utf8(self.bytes(len)?)
            .map_err(|_| IndexFormatError::Corrupt("string is not UTF-8".into()))
    }
}
