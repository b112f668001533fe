use std::io;
use std::path::{Path, PathBuf};

use json_session::JsonParseError;
use thiserror::Error;

/// Errors returned by [`crate::IndexCache`] and [`crate::LazyView`].
#[derive(Debug, Error)]
pub enum Error {
    /// The source is not well-formed JSON. No index was written.
    #[error("malformed JSON at byte {offset} (line {line}, column {column}): {message}")]
    SourceParse {
        offset: u64,
        line: u64,
        column: u64,
        message: String,
    },

    /// A persisted index could not be used. The cache never returns this from `load`; it
    /// rebuilds instead.
    #[error("unusable index file: {0}")]
    IndexFormat(#[from] IndexFormatError),

    /// The source changed and rebuilding its index failed. The previous index file is left as
    /// it was.
    #[error("rebuilding the index of {path} failed: {source}")]
    StaleIndexRebuild {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("cannot read {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A key or index that the indexed document doesn't have.
    #[error("no value at {segment}")]
    OutOfRange { segment: String },

    /// The bytes at an indexed range no longer decode, usually because the source was modified
    /// underneath an open view.
    #[error("value at byte {offset} does not decode: {source}")]
    Decode {
        offset: u64,
        #[source]
        source: serde_json::Error,
    },

    /// The value nests containers deeper than an eager parse accepts.
    #[error("value at byte {offset} nests containers more than {limit} deep")]
    TooDeep { offset: u64, limit: usize },

    #[error("cannot write index file {path}: {source}")]
    IndexWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn source_unavailable(path: &Path, source: io::Error) -> Self {
        Error::SourceUnavailable {
            path: path.to_owned(),
            source,
        }
    }

    pub(crate) fn out_of_range(segment: impl std::fmt::Display) -> Self {
        Error::OutOfRange {
            segment: segment.to_string(),
        }
    }
}

/// Why the offset scanner gave up.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Parse(#[from] JsonParseError),

    #[error("read failed after {offset} bytes: {source}")]
    Io {
        offset: u64,
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    /// Attaches the source path, producing the error reported to callers of `load`.
    pub fn into_error(self, path: &Path) -> Error {
        match self {
            ScanError::Parse(e) => {
                let location = e.location();
                Error::SourceParse {
                    offset: location.byte_offset,
                    line: location.line + 1,
                    column: location.col + 1,
                    message: e.msg().to_owned(),
                }
            }
            ScanError::Io { source, .. } => Error::source_unavailable(path, source),
        }
    }
}

/// Problems with a persisted index file.
#[derive(Debug, Error)]
pub enum IndexFormatError {
    #[error("not an index file")]
    BadMagic,

    #[error("index format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },

    #[error("index file is truncated")]
    Truncated,

    #[error("index checksum mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
