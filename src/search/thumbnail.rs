use crate::config::Settings;
use crate::error::{Result, VfsError};
use crate::search::CancellationToken;
use crate::vfs::{FileDecoder, FileId, LazyTree};
use lru::LruCache;
use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::Arc;
use tracing::debug;

/// Lines kept in a text preview
const PREVIEW_LINES: usize = 16;

/// Characters kept per preview line
const PREVIEW_LINE_WIDTH: usize = 120;

/// Bytes kept in a hex preview
const PREVIEW_BYTES: usize = 256;

/// A small preview of a file's content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thumbnail {
    /// First lines of a text projection
    Text { lines: Vec<String> },
    /// First bytes of content without a text projection
    Hex { bytes: Vec<u8>, total: u64 },
}

impl Thumbnail {
    /// Approximate heap size, used for retention accounting
    pub fn footprint(&self) -> u64 {
        let bytes = match self {
            Thumbnail::Text { lines } => lines.iter().map(|l| l.len() + 24).sum::<usize>(),
            Thumbnail::Hex { bytes, .. } => bytes.len(),
        };
        bytes as u64 + 32
    }
}

struct Retained {
    entries: LruCache<FileId, Arc<Thumbnail>>,
    bytes: u64,
}

/// Generates previews on the thumbnail pool and keeps the most recent ones
/// within a count and byte budget.
pub struct ThumbnailCache {
    tree: Arc<LazyTree>,
    decoder: Arc<dyn FileDecoder>,
    pool: Arc<ThreadPool>,
    max_count: usize,
    max_bytes: u64,
    retained: Mutex<Retained>,
}

impl ThumbnailCache {
    pub fn new(
        tree: Arc<LazyTree>,
        decoder: Arc<dyn FileDecoder>,
        pool: Arc<ThreadPool>,
        settings: &Settings,
    ) -> Self {
        Self::with_limits(
            tree,
            decoder,
            pool,
            settings.thumbnail_retention_count,
            settings.thumbnail_retention_bytes(),
        )
    }

    pub fn with_limits(
        tree: Arc<LazyTree>,
        decoder: Arc<dyn FileDecoder>,
        pool: Arc<ThreadPool>,
        max_count: usize,
        max_bytes: u64,
    ) -> Self {
        Self {
            tree,
            decoder,
            pool,
            max_count,
            max_bytes,
            retained: Mutex::new(Retained {
                entries: LruCache::unbounded(),
                bytes: 0,
            }),
        }
    }

    /// Retained preview, if any; refreshes its recency
    pub fn get(&self, id: FileId) -> Option<Arc<Thumbnail>> {
        self.retained.lock().entries.get(&id).cloned()
    }

    /// Number of retained previews and their accounted size
    pub fn retained(&self) -> (usize, u64) {
        let retained = self.retained.lock();
        (retained.entries.len(), retained.bytes)
    }

    /// Preview of `id`, generated on the thumbnail pool unless retained
    pub fn thumbnail(&self, id: FileId, token: &CancellationToken) -> Result<Arc<Thumbnail>> {
        if let Some(hit) = self.get(id) {
            return Ok(hit);
        }
        token.check()?;
        let thumbnail = Arc::new(self.pool.install(|| self.render(id))?);
        self.retain(id, Arc::clone(&thumbnail));
        Ok(thumbnail)
    }

    /// Generate previews for many files in parallel; failures are skipped
    pub fn prefetch(&self, ids: &[FileId], token: &CancellationToken) -> usize {
        self.pool.install(|| {
            ids.par_iter()
                .filter(|&&id| !token.is_cancelled() && self.thumbnail(id, token).is_ok())
                .count()
        })
    }

    fn render(&self, id: FileId) -> Result<Thumbnail> {
        let file = self
            .tree
            .file(id)
            .ok_or_else(|| VfsError::not_found(format!("file #{}", id.index())))?;
        let mut lookup = self.tree.lookup(&file, self.decoder.as_ref())?;

        let lines: Option<Vec<String>> = match lookup.text() {
            Ok(text) => Some(
                text.lines()
                    .take(PREVIEW_LINES)
                    .map(|l| l.chars().take(PREVIEW_LINE_WIDTH).collect())
                    .collect(),
            ),
            Err(VfsError::Format { .. }) => None,
            Err(e) => return Err(e),
        };
        if let Some(lines) = lines {
            return Ok(Thumbnail::Text { lines });
        }

        let bytes = lookup.bytes()?;
        Ok(Thumbnail::Hex {
            bytes: bytes[..bytes.len().min(PREVIEW_BYTES)].to_vec(),
            total: bytes.len() as u64,
        })
    }

    fn retain(&self, id: FileId, thumbnail: Arc<Thumbnail>) {
        let mut retained = self.retained.lock();
        if let Some(old) = retained.entries.put(id, Arc::clone(&thumbnail)) {
            retained.bytes -= old.footprint();
        }
        retained.bytes += thumbnail.footprint();

        while retained.entries.len() > self.max_count || retained.bytes > self.max_bytes {
            let Some((evicted, old)) = retained.entries.pop_lru() else {
                break;
            };
            retained.bytes -= old.footprint();
            debug!(file = evicted.index(), "thumbnail evicted");
        }
    }
}
