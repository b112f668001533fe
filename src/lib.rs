//! Persistent structural indexes for large JSON files.
//!
//! The first [`load`] of a JSON file scans it once and writes an index file that records the
//! byte range of every value in the document. Later loads reuse that index as long as the
//! source's size and modification time say it is current, and rebuild it otherwise. Either way
//! the result is a [`LazyView`], which reads and decodes only the values that are accessed.
//!
//! ```no_run
//! use json_index_cache::{CacheConfig, IndexCache, Navigate};
//!
//! # fn main() -> json_index_cache::Result<()> {
//! let cache = IndexCache::new(CacheConfig::new().index_directory("/tmp/json-indexes"));
//! let view = cache.load("big.json")?;
//! let name = view.get("users")?.get(1000usize)?.get("name")?;
//! println!("{:?}", name.materialize()?);
//! # Ok(())
//! # }
//! ```

mod cache;
mod codec;
mod error;
mod index;
mod reader;
mod scanner;
mod view;

use std::path::Path;

pub use cache::{is_current, CacheConfig, IndexCache, SourceMetadata, INDEX_EXTENSION};
pub use codec::{decode, encode, read_metadata, FORMAT_VERSION, MAGIC};
pub use error::{Error, IndexFormatError, Result, ScanError};
pub use index::{
    ChildRef, ContainerKind, Entry, IndexMetadata, KeyId, LeafDescriptor, LeafKind, Node, NodeId,
    Span, StructuralIndex,
};
pub use reader::IoReadIterator;
pub use scanner::{scan, ScanOptions};
pub use view::{ArrayView, LazyValue, LazyView, Navigate, ObjectView, Segment};

/// Loads `source` through a cache with the default configuration, which keeps index files
/// next to their sources.
pub fn load(source: impl AsRef<Path>) -> Result<LazyView> {
    IndexCache::default().load(source)
}
