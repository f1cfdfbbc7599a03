use crate::error::{Result, VfsError};
use crate::hashdb::types::*;
use crate::utils::{u16_at, u32_at, u64_at};
use memmap2::Mmap;
use std::fs::File;
use std::ops::{Deref, Range};
use std::path::Path;
use tracing::info;

/// Bytes behind a loaded database
#[derive(Debug)]
enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Backing {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Backing::Mapped(m) => m,
            Backing::Owned(v) => v,
        }
    }
}

/// Borrowed view of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRef<'a> {
    pub index: usize,
    pub path_hash: u32,
    pub parent_hash: u32,
    pub kind: EntryKind,
    pub segment: SegmentId,
    pub name: &'a str,
    pub offset: u64,
    pub size: u64,
}

impl RecordRef<'_> {
    pub fn to_owned(&self) -> HashRecord {
        HashRecord {
            path_hash: self.path_hash,
            parent_hash: self.parent_hash,
            kind: self.kind,
            segment: self.segment,
            name: self.name.to_string(),
            offset: self.offset,
            size: self.size,
        }
    }
}

/// Memory-mapped, validated hash database
#[derive(Debug)]
pub struct HashDatabase {
    data: Backing,
    record_count: usize,
    names_start: usize,
    /// (path_hash, record index) sorted by hash
    by_hash: Vec<(u32, u32)>,
}

impl HashDatabase {
    /// Open and validate a cache file
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let db = Self::validate(Backing::Mapped(mmap))?;
        info!(path = %path.display(), records = db.len(), "hash database loaded");
        Ok(db)
    }

    /// Validate an in-memory cache image
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::validate(Backing::Owned(bytes))
    }

    fn validate(data: Backing) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(VfsError::corruption(format!(
                "file is {} bytes, shorter than the {HEADER_SIZE}-byte header",
                data.len()
            )));
        }
        if data[..4] != MAGIC {
            return Err(VfsError::corruption("bad magic"));
        }

        let header = |pos| u32_at(&data, pos).unwrap_or(0);
        let version = header(4);
        if version != VERSION {
            return Err(VfsError::corruption(format!("unsupported version {version}")));
        }
        let record_count = header(8) as usize;
        let names_len = header(12) as usize;
        let checksum = header(16);

        let names_start = HEADER_SIZE + record_count * RECORD_SIZE;
        let expected = names_start + names_len;
        if data.len() != expected {
            return Err(VfsError::corruption(format!(
                "size mismatch: {} records and {names_len} name bytes need {expected} bytes, found {}",
                record_count,
                data.len()
            )));
        }
        if crc32fast::hash(&data[HEADER_SIZE..]) != checksum {
            return Err(VfsError::corruption("checksum mismatch"));
        }

        let mut db = Self {
            data,
            record_count,
            names_start,
            by_hash: Vec::with_capacity(record_count),
        };

        let mut prev_parent = 0u32;
        for i in 0..record_count {
            let base = db.record_base(i);
            let kind = db.data[base + 8];
            if EntryKind::from_u8(kind).is_none() {
                return Err(VfsError::corruption(format!("record {i}: invalid kind {kind}")));
            }
            let names = db.name_range(i);
            if names.end > names_len {
                return Err(VfsError::corruption(format!("record {i}: name outside table")));
            }
            let name_bytes = &db.data[db.names_start + names.start..db.names_start + names.end];
            if std::str::from_utf8(name_bytes).is_err() {
                return Err(VfsError::corruption(format!("record {i}: name is not UTF-8")));
            }

            let path_hash = u32_at(&db.data, base).unwrap_or(0);
            let parent_hash = u32_at(&db.data, base + 4).unwrap_or(0);
            if parent_hash < prev_parent {
                return Err(VfsError::corruption(format!("record {i}: records out of order")));
            }
            prev_parent = parent_hash;
            db.by_hash.push((path_hash, i as u32));
        }
        db.by_hash.sort_unstable();

        Ok(db)
    }

    #[inline]
    fn record_base(&self, index: usize) -> usize {
        HEADER_SIZE + index * RECORD_SIZE
    }

    fn name_range(&self, index: usize) -> Range<usize> {
        let base = self.record_base(index);
        let start = u32_at(&self.data, base + 12).unwrap_or(0) as usize;
        let len = u32_at(&self.data, base + 16).unwrap_or(0) as usize;
        start..start.saturating_add(len)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Record at `index` in canonical order
    pub fn record(&self, index: usize) -> Option<RecordRef<'_>> {
        if index >= self.record_count {
            return None;
        }
        let base = self.record_base(index);
        let names = self.name_range(index);
        let name_bytes = &self.data[self.names_start + names.start..self.names_start + names.end];

        Some(RecordRef {
            index,
            path_hash: u32_at(&self.data, base)?,
            parent_hash: u32_at(&self.data, base + 4)?,
            kind: EntryKind::from_u8(self.data[base + 8])?,
            segment: u16_at(&self.data, base + 10)?,
            name: std::str::from_utf8(name_bytes).ok()?,
            offset: u64_at(&self.data, base + 20)?,
            size: u64_at(&self.data, base + 28)?,
        })
    }

    fn parent_at(&self, index: usize) -> u32 {
        u32_at(&self.data, self.record_base(index) + 4).unwrap_or(u32::MAX)
    }

    /// Index range of the records whose parent is `parent_hash`
    pub fn children_range(&self, parent_hash: u32) -> Range<usize> {
        let lower = partition_point(self.record_count, |i| self.parent_at(i) < parent_hash);
        let upper = partition_point(self.record_count, |i| self.parent_at(i) <= parent_hash);
        lower..upper
    }

    /// Records whose parent is `parent_hash`, in canonical order
    pub fn children_of(&self, parent_hash: u32) -> impl Iterator<Item = RecordRef<'_>> + '_ {
        self.children_range(parent_hash)
            .filter_map(move |i| self.record(i))
    }

    /// Look up a record by its full path hash
    pub fn get(&self, path_hash: u32) -> Option<RecordRef<'_>> {
        let pos = self
            .by_hash
            .binary_search_by_key(&path_hash, |&(h, _)| h)
            .ok()?;
        self.record(self.by_hash[pos].1 as usize)
    }

    /// Iterate over every record in canonical order
    pub fn iter(&self) -> impl Iterator<Item = RecordRef<'_>> + '_ {
        (0..self.record_count).filter_map(move |i| self.record(i))
    }

    /// Counts by kind and total listed size
    pub fn stats(&self) -> DatabaseStats {
        let mut stats = DatabaseStats {
            records: self.record_count,
            names_bytes: self.data.len() - self.names_start,
            ..Default::default()
        };
        for record in self.iter() {
            match record.kind {
                EntryKind::Folder => stats.folders += 1,
                EntryKind::File => {
                    stats.files += 1;
                    stats.total_size += record.size;
                }
            }
        }
        stats
    }
}

/// First index in `0..len` for which `pred` is false (`pred` must be monotone)
fn partition_point(len: usize, pred: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}
