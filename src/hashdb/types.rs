use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Magic bytes opening every cache file
pub const MAGIC: [u8; 4] = *b"PSDB";

/// Current layout version
pub const VERSION: u32 = 1;

/// Header: magic, version, record count, names length, checksum, reserved
pub const HEADER_SIZE: usize = 4 + 4 + 4 + 4 + 4 + 4; // 24 bytes

/// Fixed-size record: hashes, kind, reserved, segment, name range, offset, size
pub const RECORD_SIZE: usize = 4 + 4 + 1 + 1 + 2 + 4 + 4 + 8 + 8; // 36 bytes

/// Segment identifier inside a packed archive
pub type SegmentId = u16;

/// Whether a record describes a folder or a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryKind {
    Folder = 0,
    File = 1,
}

impl EntryKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EntryKind::Folder),
            1 => Some(EntryKind::File),
            _ => None,
        }
    }
}

/// One row of the hash database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRecord {
    pub path_hash: u32,
    pub parent_hash: u32,
    pub kind: EntryKind,
    pub segment: SegmentId,
    /// Last path segment, original case
    pub name: String,
    pub offset: u64,
    pub size: u64,
}

impl HashRecord {
    /// Canonical record order: grouped by parent, folders first, then by name.
    ///
    /// Child enumeration order of the lazy tree is exactly this order.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.parent_hash
            .cmp(&other.parent_hash)
            .then(self.kind.cmp(&other.kind))
            .then_with(|| {
                self.name
                    .to_ascii_lowercase()
                    .cmp(&other.name.to_ascii_lowercase())
            })
            .then(self.path_hash.cmp(&other.path_hash))
    }
}

/// Summary of a loaded database
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    pub records: usize,
    pub folders: usize,
    pub files: usize,
    pub total_size: u64,
    pub names_bytes: usize,
}
