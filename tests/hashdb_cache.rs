//! Building, reopening and mounting hash database caches.

use packscope::error::VfsError;
use packscope::hashdb::{self, HashDatabase, SourceList, SourceUri};
use packscope::query::parse_matcher;
use packscope::search::{CancellationToken, SearchEngine, SearchOptions};
use packscope::utils::hash_path;
use packscope::vfs::{mount_pack, TextDecoder};
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::Arc;

const LIST: &str = "\
# path;size;offset;segment
chara/body/b0001.mdl;11;0;0
chara/body/b0002.mdl;10;11;0
common/font/axis_12.fdt;6;0;1
readme.txt;12;21;0
";

fn build_list(contents: &str, destination: &Path) -> packscope::Result<hashdb::DatabaseStats> {
    let list = SourceList::parse(contents.as_bytes())?;
    hashdb::build_from_list(&list, destination, &|_: f64| {}, 1, &CancellationToken::new())
}

#[test]
fn test_build_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.psdb");
    let second = dir.path().join("second.psdb");
    let shuffled = dir.path().join("shuffled.psdb");

    build_list(LIST, &first).unwrap();
    build_list(LIST, &second).unwrap();
    let mut lines: Vec<&str> = LIST.lines().collect();
    lines.reverse();
    build_list(&lines.join("\n"), &shuffled).unwrap();

    let bytes = fs::read(&first).unwrap();
    assert_eq!(bytes, fs::read(&second).unwrap());
    assert_eq!(bytes, fs::read(&shuffled).unwrap());
}

#[test]
fn test_reopened_cache_has_every_ancestor() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache.psdb");
    let stats = build_list(LIST, &cache).unwrap();
    assert_eq!(stats.files, 4);
    // chara, chara/body, common, common/font
    assert_eq!(stats.folders, 4);

    let db = HashDatabase::open(&cache).unwrap();
    assert_eq!(db.stats(), stats);
    for path in ["chara", "chara/body", "common/font", "common/font/axis_12.fdt"] {
        assert!(db.get(hash_path(path)).is_some(), "missing {path}");
    }
}

#[test]
fn test_progress_is_monotonic_and_reaches_one() {
    let dir = tempfile::tempdir().unwrap();
    let list_path = dir.path().join("paths.txt");
    let body: String = (0..100).map(|i| format!("dir{}/file{i}.bin;{i}\n", i % 7)).collect();
    fs::write(&list_path, body).unwrap();

    let seen = Mutex::new(Vec::new());
    let report = |fraction: f64| seen.lock().push(fraction);
    hashdb::build(
        &SourceUri::parse(list_path.to_str().unwrap()),
        &dir.path().join("cache.psdb"),
        &report,
        10,
        &CancellationToken::new(),
    )
    .unwrap();

    let seen = seen.into_inner();
    assert!(seen.len() > 2);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.last().copied(), Some(1.0));
}

#[test]
fn test_cancelled_build_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache.psdb");
    let list = SourceList::parse(LIST.as_bytes()).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let err = hashdb::build_from_list(&list, &cache, &|_: f64| {}, 1, &token).unwrap_err();

    assert!(matches!(err, VfsError::Cancelled));
    assert!(!cache.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_pack_mount_reads_segments() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("game.dat0"), b"vertex dataindex datahello vertex").unwrap();
    fs::write(dir.path().join("game.dat1"), b"glyphs").unwrap();
    let cache = dir.path().join("game.psdb");
    build_list(LIST, &cache).unwrap();

    let tree = Arc::new(mount_pack(&dir.path().join("game"), HashDatabase::open(&cache).unwrap()));
    let font = tree.find("common/font/axis_12.fdt").unwrap().as_file().unwrap();
    let font = tree.file(font).unwrap();
    let mut lookup = tree.lookup(&font, &TextDecoder).unwrap();
    assert_eq!(lookup.text().unwrap(), "glyphs");

    let pool = Arc::new(rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap());
    let engine = SearchEngine::new(tree, Arc::new(TextDecoder), pool);
    let report = engine
        .search(parse_matcher("content:vertex").unwrap(), SearchOptions::default(), &CancellationToken::new())
        .into_report();
    assert!(report.is_complete());
    let paths: Vec<_> = report.hits.into_iter().map(|h| h.path).collect();
    assert_eq!(paths, vec!["readme.txt", "chara/body/b0001.mdl"]);
}

#[test]
fn test_corrupt_cache_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache.psdb");
    build_list(LIST, &cache).unwrap();

    let mut bytes = fs::read(&cache).unwrap();
    bytes.truncate(bytes.len() - 3);
    fs::write(&cache, &bytes).unwrap();

    assert!(matches!(HashDatabase::open(&cache), Err(VfsError::Corruption(_))));
}
