//! Locating, validating, building and persisting structural indexes.

use std::fs::{self, File};
use std::io::{self, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

use atomic_write_file::AtomicWriteFile;
use tracing::{debug, info, warn};

use crate::codec::{self, FORMAT_VERSION};
use crate::error::{Error, IndexFormatError, Result};
use crate::index::{IndexMetadata, StructuralIndex};
use crate::scanner::{self, ScanOptions};
use crate::view::LazyView;

/// File extension of index files.
pub const INDEX_EXTENSION: &str = "jidx";

/// Longest file name most filesystems accept, in bytes.
const MAX_FILE_NAME_LEN: usize = 255;

/// Where index files go and how deep they index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory for all index files. When unset, each index is written next to its source
    /// as `<file name>.jidx`.
    pub index_directory: Option<PathBuf>,
    /// Containers nested deeper than this are stored as leaves and decoded as a whole when
    /// accessed. `None` indexes every container.
    pub max_depth: Option<u32>,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.index_directory = Some(dir.into());
        self
    }

    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = Some(max_depth);
        self
    }
}

/// The parts of a source file's metadata that decide whether its index is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMetadata {
    pub len: u64,
    pub modified: SystemTime,
}

impl SourceMetadata {
    pub fn from_file(file: &File) -> io::Result<Self> {
        Self::from_metadata(&file.metadata()?)
    }

    pub fn from_path(path: &Path) -> io::Result<Self> {
        Self::from_metadata(&fs::metadata(path)?)
    }

    fn from_metadata(metadata: &fs::Metadata) -> io::Result<Self> {
        Ok(Self {
            len: metadata.len(),
            modified: metadata.modified()?,
        })
    }
}

/// Whether an index built with `index` metadata still describes a source with `source`
/// metadata.
///
/// The recorded modification time may be newer than the current one, which tolerates file
/// systems with coarse timestamps. A rewrite that keeps both the size and the timestamp goes
/// unnoticed.
pub fn is_current(source: &SourceMetadata, index: Option<&IndexMetadata>) -> bool {
    match index {
        Some(index) => index.source_modified >= source.modified && index.source_len == source.len,
        None => false,
    }
}

/// Builds indexes on first use and reuses them while they are current.
///
/// Each cache is independent; there is no process-wide state.
#[derive(Debug, Default)]
pub struct IndexCache {
    config: CacheConfig,
    scans: AtomicU64,
}

impl IndexCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            scans: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// How many times this cache has scanned a source document.
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// The index file location for `source`. Depends only on the source's canonical path, never
    /// on its contents, and does not check whether the index exists.
    pub fn resolve_index_location(&self, source: &Path) -> Result<PathBuf> {
        let canonical = canonicalize(source)?;
        Ok(self.index_location_for(&canonical))
    }

    fn index_location_for(&self, canonical: &Path) -> PathBuf {
        let file_name = canonical
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        let sibling = format!("{file_name}.{INDEX_EXTENSION}");
        match &self.config.index_directory {
            Some(dir) => dir.join(hashed_file_name(canonical, &file_name)),
            None if sibling.len() <= MAX_FILE_NAME_LEN => canonical.with_file_name(sibling),
            None => canonical.with_file_name(hashed_file_name(canonical, &file_name)),
        }
    }

    /// Opens a lazy view of `source`, building or rebuilding its index if needed.
    pub fn load(&self, source: impl AsRef<Path>) -> Result<LazyView> {
        let source = source.as_ref();
        let canonical = canonicalize(source)?;
        let mut file = File::open(&canonical).map_err(|e| Error::source_unavailable(source, e))?;
        let (index, metadata) = self.load_or_build_from(&canonical, &mut file)?;
        Ok(LazyView::new(file, canonical, index, metadata))
    }

    /// Returns the index of `source`, loading it from disk if it's current and building and
    /// persisting it otherwise.
    pub fn load_or_build(
        &self,
        source: impl AsRef<Path>,
    ) -> Result<(StructuralIndex, IndexMetadata)> {
        let source = source.as_ref();
        let canonical = canonicalize(source)?;
        let mut file = File::open(&canonical).map_err(|e| Error::source_unavailable(source, e))?;
        self.load_or_build_from(&canonical, &mut file)
    }

    /// Scans `source` and persists the result, regardless of any existing index. Unlike the
    /// rebuilds done by [`IndexCache::load`], failing to write the index is an error here.
    pub fn rebuild(&self, source: impl AsRef<Path>) -> Result<(StructuralIndex, IndexMetadata)> {
        let source = source.as_ref();
        let canonical = canonicalize(source)?;
        let mut file = File::open(&canonical).map_err(|e| Error::source_unavailable(source, e))?;
        let location = self.index_location_for(&canonical);
        let (index, metadata, bytes) = self.build(&canonical, &mut file)?;
        write_index(&location, &bytes)?;
        Ok((index, metadata))
    }

    /// Deletes the persisted index of `source`. Returns whether there was one.
    pub fn invalidate(&self, source: impl AsRef<Path>) -> Result<bool> {
        let location = self.resolve_index_location(source.as_ref())?;
        match fs::remove_file(&location) {
            Ok(()) => {
                debug!(index = %location.display(), "removed index");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::IndexWrite {
                path: location,
                source: e,
            }),
        }
    }

    fn load_or_build_from(
        &self,
        canonical: &Path,
        file: &mut File,
    ) -> Result<(StructuralIndex, IndexMetadata)> {
        let location = self.index_location_for(canonical);
        let source_metadata =
            SourceMetadata::from_file(file).map_err(|e| Error::source_unavailable(canonical, e))?;

        let (had_index, existing) = match File::open(&location) {
            Ok(index_file) => match codec::read_metadata(BufReader::new(index_file)) {
                Ok(metadata) => (true, Some(metadata)),
                Err(e) => {
                    warn!(index = %location.display(), "ignoring index file: {e}");
                    (true, None)
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => (false, None),
            Err(e) => {
                warn!(index = %location.display(), "cannot open index file: {e}");
                (true, None)
            }
        };

        if let Some(existing) = existing {
            if self.is_usable(canonical, &source_metadata, &existing) {
                match read_index(&location) {
                    Ok(loaded) => {
                        debug!(index = %location.display(), "index is current");
                        return Ok(loaded);
                    }
                    Err(e) => warn!(index = %location.display(), "discarding index: {e}"),
                }
            } else {
                info!(
                    source = %canonical.display(),
                    index = %location.display(),
                    "index is stale"
                );
            }
        }

        let (index, metadata, bytes) = match self.build(canonical, file) {
            Ok(built) => built,
            Err(e) if had_index => {
                return Err(Error::StaleIndexRebuild {
                    path: canonical.to_owned(),
                    source: Box::new(e),
                })
            }
            Err(e) => return Err(e),
        };
        // The index is still usable in memory; only the next load will have to scan again.
        if let Err(e) = write_index(&location, &bytes) {
            warn!("{e}");
        }
        Ok((index, metadata))
    }

    fn is_usable(
        &self,
        canonical: &Path,
        source: &SourceMetadata,
        existing: &IndexMetadata,
    ) -> bool {
        is_current(source, Some(existing))
            && existing.source_path == canonical
            && existing.max_depth == self.config.max_depth
            && existing.format_version == FORMAT_VERSION
    }

    /// Scans the source and encodes the index. Nothing is written here.
    fn build(
        &self,
        canonical: &Path,
        file: &mut File,
    ) -> Result<(StructuralIndex, IndexMetadata, Vec<u8>)> {
        // Metadata is taken before the scan, so a write racing with the scan leaves an index
        // that looks stale on the next load.
        let source_metadata =
            SourceMetadata::from_file(file).map_err(|e| Error::source_unavailable(canonical, e))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| Error::source_unavailable(canonical, e))?;

        let start = Instant::now();
        self.scans.fetch_add(1, Ordering::Relaxed);
        let options = ScanOptions {
            max_depth: self.config.max_depth,
        };
        let index = scanner::scan(&mut *file, &options).map_err(|e| e.into_error(canonical))?;

        let metadata = IndexMetadata {
            source_path: canonical.to_owned(),
            source_len: source_metadata.len,
            source_modified: source_metadata.modified,
            max_depth: self.config.max_depth,
            format_version: FORMAT_VERSION,
        };
        let bytes = codec::encode(&index, &metadata);
        info!(
            source = %canonical.display(),
            nodes = index.node_count(),
            index_bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "built index"
        );
        Ok((index, metadata, bytes))
    }
}

/// `<32 hex digits of the path hash>-<file name>.jidx`, with the file name cut short so the
/// result fits in `MAX_FILE_NAME_LEN` bytes. The hash keeps truncated names apart.
fn hashed_file_name(canonical: &Path, file_name: &str) -> String {
    let hash = blake3::hash(canonical.to_string_lossy().as_bytes());
    let hex = hash.to_hex();
    let prefix = &hex.as_str()[..32];
    let budget = MAX_FILE_NAME_LEN - prefix.len() - "-.".len() - INDEX_EXTENSION.len();
    let mut end = file_name.len().min(budget);
    while !file_name.is_char_boundary(end) {
        end -= 1;
    }
    format!("{prefix}-{}.{INDEX_EXTENSION}", &file_name[..end])
}

fn canonicalize(source: &Path) -> Result<PathBuf> {
    fs::canonicalize(source).map_err(|e| Error::source_unavailable(source, e))
}

fn read_index(location: &Path) -> std::result::Result<(StructuralIndex, IndexMetadata), IndexFormatError> {
    let bytes = fs::read(location)?;
    codec::decode(&bytes)
}

/// Replaces the index file atomically, so readers see either the old or the new index.
fn write_index(location: &Path, bytes: &[u8]) -> Result<()> {
    let write_err = |source| Error::IndexWrite {
        path: location.to_owned(),
        source,
    };
    if let Some(parent) = location.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let mut file = AtomicWriteFile::open(location).map_err(write_err)?;
    file.write_all(bytes).map_err(write_err)?;
    file.commit().map_err(write_err)?;
    debug!(index = %location.display(), bytes = bytes.len(), "wrote index");
    Ok(())
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    fn metadata(len: u64, modified: SystemTime) -> IndexMetadata {
        IndexMetadata {
            source_path: PathBuf::from("/x.json"),
            source_len: len,
            source_modified: modified,
            max_depth: None,
            format_version: FORMAT_VERSION,
        }
    }

    #[test]
    fn test_is_current() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let source = SourceMetadata { len: 10, modified: t };

        assert!(!is_current(&source, None));
        assert!(is_current(&source, Some(&metadata(10, t))));
        assert!(is_current(
            &source,
            Some(&metadata(10, t + Duration::from_secs(1)))
        ));
        assert!(!is_current(
            &source,
            Some(&metadata(10, t - Duration::from_nanos(1)))
        ));
        assert!(!is_current(&source, Some(&metadata(11, t))));
    }

    #[test]
    fn test_index_locations() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("data.json");
        fs::write(&source, "[]").unwrap();
        let canonical = fs::canonicalize(&source).unwrap();

        let sibling = IndexCache::default();
        assert_eq!(
            sibling.resolve_index_location(&source).unwrap(),
            canonical.with_file_name("data.json.jidx")
        );

        let cache_dir = dir.path().join("cache");
        let cache = IndexCache::new(CacheConfig::new().index_directory(&cache_dir));
        let location = cache.resolve_index_location(&source).unwrap();
        assert_eq!(location.parent(), Some(cache_dir.as_path()));
        let name = location.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("-data.json.jidx"), "{name}");
        assert_eq!(name.len(), 32 + "-data.json.jidx".len());

        // Deterministic, and independent of the spelling of the path.
        let dotted = dir.path().join(".").join("data.json");
        assert_eq!(cache.resolve_index_location(&dotted).unwrap(), location);

        let other = dir.path().join("other.json");
        fs::write(&other, "[]").unwrap();
        let other_location = cache.resolve_index_location(&other).unwrap();
        assert_ne!(other_location, location);
    }

    #[test]
    fn test_long_file_names_are_shortened() {
        let dir = Path::new("/data");
        let long_ascii = format!("{}.json", "a".repeat(300));
        let long_utf8 = format!("{}.json", "é".repeat(130));
        let borderline = format!("{}.json", "b".repeat(MAX_FILE_NAME_LEN - ".json.jidx".len()));

        for config in [CacheConfig::new(), CacheConfig::new().index_directory("/indexes")] {
            let cache = IndexCache::new(config);
            for name in [&long_ascii, &long_utf8] {
                let location = cache.index_location_for(&dir.join(name));
                let file_name = location.file_name().unwrap().to_str().unwrap();
                assert!(file_name.len() <= MAX_FILE_NAME_LEN, "{}", file_name.len());
                assert!(file_name.ends_with(".jidx"));
                assert_eq!(file_name.as_bytes()[32], b'-');
            }

            // Names that differ only past the cut still get their own index.
            let a = cache.index_location_for(&dir.join(format!("{}x.json", "c".repeat(300))));
            let b = cache.index_location_for(&dir.join(format!("{}y.json", "c".repeat(300))));
            assert_ne!(a, b);
        }

        let sibling = IndexCache::default().index_location_for(&dir.join(&borderline));
        assert_eq!(sibling, dir.join(format!("{borderline}.jidx")));
        assert_eq!(sibling.file_name().unwrap().len(), MAX_FILE_NAME_LEN);
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::default();
        match cache.load(dir.path().join("nope.json")) {
            Err(Error::SourceUnavailable { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound)
            }
            other => panic!("expected SourceUnavailable, got {other:?}"),
        }
        assert_eq!(cache.scan_count(), 0);
    }
}
