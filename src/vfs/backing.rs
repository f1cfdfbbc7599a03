use crate::error::{Result, VfsError};
use crate::hashdb::SegmentId;
use crate::vfs::entry::Locator;
use memmap2::Mmap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Everything a store needs to find one file's bytes
#[derive(Debug, Clone)]
pub struct ReadRequest<'a> {
    /// Virtual path, `/`-separated, original case
    pub path: &'a str,
    pub locator: Locator,
}

/// Source of raw file bytes behind the virtual tree
pub trait ByteRangeProvider: Send + Sync {
    /// Open a reader over the file's bytes
    fn open(&self, request: &ReadRequest<'_>) -> Result<Box<dyn Read + Send>>;

    /// Short label for logs
    fn describe(&self) -> String;
}

/// Serves files from a real directory tree rooted at `root`
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let mut full = self.root.clone();
        for segment in path.split(['/', '\\']).filter(|s| !s.is_empty()) {
            if segment == ".." || segment == "." {
                return Err(VfsError::not_found(path));
            }
            full.push(segment);
        }
        Ok(full)
    }
}

impl ByteRangeProvider for DirectoryStore {
    fn open(&self, request: &ReadRequest<'_>) -> Result<Box<dyn Read + Send>> {
        let full = self.resolve(request.path)?;
        match File::open(&full) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(VfsError::not_found(request.path))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        format!("dir:{}", self.root.display())
    }
}

/// Serves byte ranges out of numbered pack segments `<stem>.dat<N>`.
///
/// Segments are mapped on first use and stay mapped for the store's lifetime.
pub struct PackStore {
    stem: PathBuf,
    segments: RwLock<FxHashMap<SegmentId, Arc<Mmap>>>,
}

impl PackStore {
    /// `stem` is the pack path without the `.datN` suffix
    pub fn new(stem: impl Into<PathBuf>) -> Self {
        Self {
            stem: stem.into(),
            segments: RwLock::new(FxHashMap::default()),
        }
    }

    /// Path of segment `segment`
    pub fn segment_path(&self, segment: SegmentId) -> PathBuf {
        let mut name = self.stem.as_os_str().to_owned();
        name.push(format!(".dat{segment}"));
        PathBuf::from(name)
    }

    fn segment(&self, segment: SegmentId) -> Result<Arc<Mmap>> {
        if let Some(map) = self.segments.read().get(&segment) {
            return Ok(Arc::clone(map));
        }

        let path = self.segment_path(segment);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VfsError::not_found(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let mmap = Arc::new(unsafe { Mmap::map(&file)? });
        debug!(segment, path = %path.display(), bytes = mmap.len(), "mapped pack segment");

        // Another thread may have mapped it meanwhile; keep the first
        let mut segments = self.segments.write();
        Ok(Arc::clone(segments.entry(segment).or_insert(mmap)))
    }
}

impl ByteRangeProvider for PackStore {
    fn open(&self, request: &ReadRequest<'_>) -> Result<Box<dyn Read + Send>> {
        let locator = request.locator;
        let map = self.segment(locator.segment)?;

        let start = usize::try_from(locator.offset).ok();
        let end = start.and_then(|s| s.checked_add(usize::try_from(locator.size).ok()?));
        match (start, end) {
            (Some(start), Some(end)) if end <= map.len() => {
                Ok(Box::new(Cursor::new(MappedRange { map, start, end })))
            }
            _ => Err(VfsError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "{}: range {}+{} exceeds segment {} ({} bytes)",
                    request.path,
                    locator.offset,
                    locator.size,
                    locator.segment,
                    map.len()
                ),
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("pack:{}", self.stem.display())
    }
}

/// A window into a shared mapping
struct MappedRange {
    map: Arc<Mmap>,
    start: usize,
    end: usize,
}

impl AsRef<[u8]> for MappedRange {
    fn as_ref(&self) -> &[u8] {
        &self.map[self.start..self.end]
    }
}
