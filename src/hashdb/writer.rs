use crate::error::{Result, VfsError};
use crate::hashdb::source::{SourceEntry, SourceList, SourceUri};
use crate::hashdb::types::*;
use crate::search::CancellationToken;
use crate::utils::{split_path, write_u16_le, write_u32_le, write_u64_le, PathHasher, ROOT_HASH};
use rustc_hash::FxHashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Progress callback: receives a fraction in `0.0..=1.0`
pub type ProgressFn<'a> = &'a (dyn Fn(f64) + Sync);

/// Accumulates hash records and serializes them into the cache layout
pub struct HashDbWriter {
    records: Vec<HashRecord>,
    /// path_hash -> normalized path, for dedup and collision checks
    seen: FxHashMap<u32, String>,
    collisions: usize,
}

impl HashDbWriter {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            seen: FxHashMap::default(),
            collisions: 0,
        }
    }

    /// Add a listed file and every ancestor folder it implies
    pub fn add_entry(&mut self, entry: &SourceEntry) {
        let segments: Vec<&str> = split_path(&entry.path).collect();
        let Some((file_name, folders)) = segments.split_last() else {
            return;
        };

        let mut hasher = PathHasher::new();
        let mut parent_hash = ROOT_HASH;
        for folder in folders {
            hasher.push(folder);
            let hash = hasher.finish();
            self.insert(
                HashRecord {
                    path_hash: hash,
                    parent_hash,
                    kind: EntryKind::Folder,
                    segment: 0,
                    name: folder.to_string(),
                    offset: 0,
                    size: 0,
                },
                &segments[..hasher.depth()],
            );
            parent_hash = hash;
        }

        hasher.push(file_name);
        self.insert(
            HashRecord {
                path_hash: hasher.finish(),
                parent_hash,
                kind: EntryKind::File,
                segment: entry.segment,
                name: file_name.to_string(),
                offset: entry.offset,
                size: entry.size,
            },
            &segments,
        );
    }

    fn insert(&mut self, record: HashRecord, segments: &[&str]) {
        let normalized = segments.join("/").to_ascii_lowercase();
        if let Some(existing) = self.seen.get(&record.path_hash) {
            if *existing != normalized {
                self.collisions += 1;
                warn!(
                    hash = format_args!("{:08x}", record.path_hash),
                    kept = %existing,
                    dropped = %normalized,
                    "path hash collision"
                );
            }
            return;
        }
        self.seen.insert(record.path_hash, normalized);
        self.records.push(record);
    }

    /// Number of records accumulated so far
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Number of colliding paths that were dropped
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    /// Sort into canonical order and serialize
    pub fn finish<W: Write>(mut self, out: &mut W) -> Result<DatabaseStats> {
        self.records.sort_by(HashRecord::canonical_cmp);

        let mut names = Vec::new();
        let mut body = Vec::with_capacity(self.records.len() * RECORD_SIZE);
        let mut stats = DatabaseStats::default();

        for record in &self.records {
            let name_offset = names.len() as u32;
            names.extend_from_slice(record.name.as_bytes());

            write_u32_le(&mut body, record.path_hash)?;
            write_u32_le(&mut body, record.parent_hash)?;
            body.push(record.kind as u8);
            body.push(0);
            write_u16_le(&mut body, record.segment)?;
            write_u32_le(&mut body, name_offset)?;
            write_u32_le(&mut body, record.name.len() as u32)?;
            write_u64_le(&mut body, record.offset)?;
            write_u64_le(&mut body, record.size)?;

            match record.kind {
                EntryKind::Folder => stats.folders += 1,
                EntryKind::File => {
                    stats.files += 1;
                    stats.total_size += record.size;
                }
            }
        }

        let mut checksum = crc32fast::Hasher::new();
        checksum.update(&body);
        checksum.update(&names);

        out.write_all(&MAGIC)?;
        write_u32_le(out, VERSION)?;
        write_u32_le(out, self.records.len() as u32)?;
        write_u32_le(out, names.len() as u32)?;
        write_u32_le(out, checksum.finalize())?;
        write_u32_le(out, 0)?;
        out.write_all(&body)?;
        out.write_all(&names)?;
        out.flush()?;

        stats.records = self.records.len();
        stats.names_bytes = names.len();
        Ok(stats)
    }
}

impl Default for HashDbWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a cache file from a source list.
///
/// The cache is written to a temporary file next to `destination` and
/// renamed over it only after every byte is on disk, so cancellation or
/// failure never leaves a partial file behind.
pub fn build(
    source: &SourceUri,
    destination: &Path,
    progress: ProgressFn<'_>,
    progress_interval: usize,
    token: &CancellationToken,
) -> Result<DatabaseStats> {
    token.check()?;
    let list = SourceList::fetch(source)?;
    token.check()?;
    build_from_list(&list, destination, progress, progress_interval, token)
}

/// Build a cache file from an already parsed list
pub fn build_from_list(
    list: &SourceList,
    destination: &Path,
    progress: ProgressFn<'_>,
    progress_interval: usize,
    token: &CancellationToken,
) -> Result<DatabaseStats> {
    let dir = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let tmp = NamedTempFile::new_in(dir)?;

    let interval = progress_interval.max(1);
    let total = list.len().max(1);
    let mut writer = HashDbWriter::new();

    progress(0.0);
    for (i, entry) in list.entries.iter().enumerate() {
        if i % interval == 0 {
            token.check()?;
            if i > 0 {
                // Serialization is the last stretch; keep entry ingestion below 1.0
                progress(i as f64 / total as f64 * 0.95);
            }
        }
        writer.add_entry(entry);
    }
    token.check()?;

    let mut out = BufWriter::new(tmp.as_file());
    let stats = writer.finish(&mut out)?;
    drop(out);
    tmp.as_file().sync_all()?;

    token.check()?;
    tmp.persist(destination)
        .map_err(|e| VfsError::Io(e.error))?;
    progress(1.0);

    info!(
        destination = %destination.display(),
        records = stats.records,
        files = stats.files,
        "hash database written"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::hash_path;
    use std::sync::Mutex;

    fn entry(path: &str, size: u64) -> SourceEntry {
        SourceEntry {
            path: path.to_string(),
            size,
            offset: 0,
            segment: 0,
        }
    }

    #[test]
    fn test_add_entry_creates_folders() {
        let mut writer = HashDbWriter::new();
        writer.add_entry(&entry("chara/equipment/e0001/top.mdl", 10));
        writer.add_entry(&entry("chara/equipment/e0002/top.mdl", 20));

        // chara, equipment, e0001, e0002 + two files
        assert_eq!(writer.record_count(), 6);

        let folder = writer
            .records
            .iter()
            .find(|r| r.path_hash == hash_path("chara/equipment"))
            .unwrap();
        assert_eq!(folder.kind, EntryKind::Folder);
        assert_eq!(folder.parent_hash, hash_path("chara"));
    }

    #[test]
    fn test_duplicate_paths_keep_first() {
        let mut writer = HashDbWriter::new();
        writer.add_entry(&entry("a/b.txt", 1));
        writer.add_entry(&entry("A\\B.TXT", 2));
        assert_eq!(writer.record_count(), 2);
        assert_eq!(writer.collisions(), 0);

        let file = writer.records.iter().find(|r| r.kind == EntryKind::File).unwrap();
        assert_eq!(file.size, 1);
    }

    #[test]
    fn test_finish_layout_size() {
        let mut writer = HashDbWriter::new();
        writer.add_entry(&entry("x/y.bin", 5));
        let mut out = Vec::new();
        let stats = writer.finish(&mut out).unwrap();

        assert_eq!(stats.records, 2);
        assert_eq!(stats.files, 1);
        assert_eq!(stats.total_size, 5);
        assert_eq!(out.len(), HEADER_SIZE + 2 * RECORD_SIZE + "x".len() + "y.bin".len());
        assert_eq!(&out[..4], &MAGIC);
    }

    #[test]
    fn test_build_reports_progress_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let list = SourceList {
            entries: (0..100).map(|i| entry(&format!("d{}/f{}.txt", i % 7, i), i)).collect(),
        };
        let seen = Mutex::new(Vec::new());
        let report = |f: f64| seen.lock().unwrap().push(f);

        let first = dir.path().join("one.psdb");
        let second = dir.path().join("two.psdb");
        let token = CancellationToken::new();
        build_from_list(&list, &first, &report, 16, &token).unwrap();
        build_from_list(&list, &second, &report, 16, &token).unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());

        let seen = seen.into_inner().unwrap();
        // 0.0, six intermediate reports, 1.0 - per build
        assert_eq!(seen.len(), 2 * 8);
        assert!(seen.windows(2).take(7).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 1.0);
    }

    #[test]
    fn test_cancelled_build_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("cache.psdb");
        let list = SourceList {
            entries: vec![entry("a.txt", 1)],
        };
        let token = CancellationToken::new();
        token.cancel();

        let err = build_from_list(&list, &destination, &|_: f64| {}, 1, &token).unwrap_err();
        assert!(matches!(err, VfsError::Cancelled));
        assert!(!destination.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
