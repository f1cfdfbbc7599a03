//! Path normalization and the CRC-32 path digest used as the primary key of
//! every hash record.

use crc32fast::Hasher;

/// Separator used by every virtual path
pub const SEPARATOR: char = '/';

/// Hash of the root folder (the empty path)
pub const ROOT_HASH: u32 = 0;

/// Normalize a path: forward slashes, no empty segments, ASCII lower-case
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for segment in split_path(path) {
        if !out.is_empty() {
            out.push(SEPARATOR);
        }
        out.push_str(&segment.to_ascii_lowercase());
    }
    out
}

/// Split a path into its non-empty segments, accepting either separator
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty())
}

/// Hash a full path
pub fn hash_path(path: &str) -> u32 {
    let mut hasher = PathHasher::new();
    for segment in split_path(path) {
        hasher.push(segment);
    }
    hasher.finish()
}

/// Incremental path hasher.
///
/// Each `push` extends the running digest with one more segment, so walking
/// `a`, `a/b`, `a/b/c` costs one pass over the bytes instead of three.
#[derive(Clone, Default)]
pub struct PathHasher {
    inner: Hasher,
    depth: usize,
}

impl PathHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the path by one segment
    pub fn push(&mut self, segment: &str) {
        if self.depth > 0 {
            self.inner.update(b"/");
        }
        self.inner.update(segment.to_ascii_lowercase().as_bytes());
        self.depth += 1;
    }

    /// Hash of the current prefix
    pub fn finish(&self) -> u32 {
        if self.depth == 0 {
            ROOT_HASH
        } else {
            self.inner.clone().finalize()
        }
    }

    /// Number of segments pushed so far
    pub fn depth(&self) -> usize {
        self.depth
    }
}
