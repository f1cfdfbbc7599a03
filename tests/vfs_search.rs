//! End-to-end behavior of the lazy tree and the search engine over real
//! directories and in-memory hash databases.

use packscope::error::{Result, VfsError};
use packscope::hashdb::{HashDatabase, HashDbWriter, SourceEntry};
use packscope::query::parse_matcher;
use packscope::search::{CancellationToken, SearchEngine, SearchOptions, SearchStatus};
use packscope::utils::hash_path;
use packscope::vfs::{
    mount_directory, DecodedResource, DirectoryStore, FileDecoder, LazyTree, TextDecoder,
};
use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn tree_from_paths(paths: &[(&str, u64)]) -> LazyTree {
    let mut writer = HashDbWriter::new();
    for (path, size) in paths {
        writer.add_entry(&SourceEntry {
            path: path.to_string(),
            size: *size,
            offset: 0,
            segment: 0,
        });
    }
    let mut image = Vec::new();
    writer.finish(&mut image).unwrap();
    LazyTree::new(
        Arc::new(HashDatabase::from_bytes(image).unwrap()),
        Arc::new(DirectoryStore::new("/nonexistent")),
    )
}

fn engine_over(dir: &std::path::Path, threads: usize, decoder: Arc<dyn FileDecoder>) -> SearchEngine {
    let tree = Arc::new(mount_directory(dir).unwrap());
    let pool = Arc::new(
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap(),
    );
    SearchEngine::new(tree, decoder, pool)
}

fn search_paths(engine: &SearchEngine, query: &str) -> Vec<String> {
    let report = engine
        .search(parse_matcher(query).unwrap(), SearchOptions::default(), &CancellationToken::new())
        .into_report();
    assert!(report.is_complete(), "{:?}", report.error);
    report.hits.into_iter().map(|h| h.path).collect()
}

#[test]
fn test_resolved_hashes_match_full_path_hashes() {
    let tree = tree_from_paths(&[("Chara/Body/B0001.mdl", 10), ("chara/face/f0001.tex", 4)]);

    let entry = tree.find("chara/body/b0001.mdl").unwrap();
    assert_eq!(tree.hash_of(entry), Some(hash_path("chara/body/b0001.mdl")));

    for prefix in ["chara", "chara/body"] {
        let folder = tree.find(prefix).unwrap();
        assert!(folder.is_folder());
        assert_eq!(tree.hash_of(folder), Some(hash_path(prefix)));
    }

    // Recorded case survives lookup by any case
    assert_eq!(tree.path_of(entry).unwrap(), "Chara/Body/B0001.mdl");
}

#[test]
fn test_missing_path_is_not_found() {
    let tree = tree_from_paths(&[("a/b.txt", 1)]);
    assert!(matches!(tree.find("a/c.txt"), Err(VfsError::NotFound(_))));
    assert!(matches!(tree.find("a/b.txt/deeper"), Err(VfsError::NotFound(_))));
}

#[test]
fn test_concurrent_materialization_happens_once() {
    let paths: Vec<(String, u64)> = (0..500).map(|i| (format!("folder/file{i:04}.bin"), i)).collect();
    let borrowed: Vec<(&str, u64)> = paths.iter().map(|(p, s)| (p.as_str(), *s)).collect();
    let tree = Arc::new(tree_from_paths(&borrowed));
    let folder = tree.find("folder").unwrap().as_folder().unwrap();
    let before = tree.materialization_count();

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let tree = Arc::clone(&tree);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                tree.children(folder).unwrap()
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for children in &results[1..] {
        assert!(Arc::ptr_eq(&results[0], children));
    }
    assert_eq!(results[0].len(), 500);
    assert_eq!(tree.materialization_count(), before + 1);
    assert_eq!(tree.node_count().1, 500);
}

#[test]
fn test_double_negation_unwraps() {
    assert_eq!(parse_matcher("--b0001").unwrap(), parse_matcher("b0001").unwrap());
    assert_eq!(parse_matcher("!-size:10").unwrap(), parse_matcher("size:10").unwrap());
}

#[test]
fn test_single_star_stays_in_one_folder() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("chara/body")).unwrap();
    fs::write(dir.path().join("chara/top.mdl"), "a").unwrap();
    fs::write(dir.path().join("chara/body/deep.mdl"), "b").unwrap();

    let engine = engine_over(dir.path(), 2, Arc::new(TextDecoder));
    assert_eq!(search_paths(&engine, "path:chara/*"), vec!["chara/top.mdl"]);
    assert_eq!(
        search_paths(&engine, "path:chara/**"),
        vec!["chara/top.mdl", "chara/body/deep.mdl"]
    );
}

#[test]
fn test_size_bounds_are_inclusive() {
    let tree = tree_from_paths(&[("s99", 99), ("s100", 100), ("s150", 150), ("s200", 200), ("s201", 201)]);
    let pool = Arc::new(rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap());
    let engine = SearchEngine::new(Arc::new(tree), Arc::new(TextDecoder), pool);

    let mut found = search_paths(&engine, "size:100..200");
    found.sort();
    assert_eq!(found, vec!["s100", "s150", "s200"]);
}

/// Decodes like [`TextDecoder`] after a fixed delay
struct SlowDecoder(Duration);

impl FileDecoder for SlowDecoder {
    fn decode(&self, bytes: &[u8], type_hint: &str) -> Result<DecodedResource> {
        thread::sleep(self.0);
        TextDecoder.decode(bytes, type_hint)
    }
}

#[test]
fn test_budget_is_shared_by_the_whole_query() {
    let dir = tempfile::tempdir().unwrap();
    let files = 200;
    for i in 0..files {
        fs::write(dir.path().join(format!("f{i:03}.txt")), "nothing to see").unwrap();
    }

    let engine = engine_over(dir.path(), 2, Arc::new(SlowDecoder(Duration::from_millis(5))));
    let options = SearchOptions {
        timeout: Some(Duration::from_millis(50)),
        ..SearchOptions::default()
    };
    let report = engine
        .search(parse_matcher("content:needle").unwrap(), options, &CancellationToken::new())
        .into_report();

    assert_eq!(report.status, SearchStatus::TimedOut);
    assert!(matches!(report.error, Some(VfsError::Timeout { .. })));
    assert!(report.stats.evaluated < files, "evaluated {}", report.stats.evaluated);
}

#[test]
fn test_dropping_results_stops_the_walk() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..50 {
        fs::write(dir.path().join(format!("f{i:02}.txt")), "x").unwrap();
    }
    let engine = engine_over(dir.path(), 1, Arc::new(SlowDecoder(Duration::from_millis(2))));

    let mut results = engine.search(
        parse_matcher("content:x").unwrap(),
        SearchOptions::default(),
        &CancellationToken::new(),
    );
    assert!(results.next().is_some());
    drop(results);

    // The walker observes the drop and exits; a fresh search still works
    let found = search_paths(&engine, "f00");
    assert_eq!(found, vec!["f00.txt"]);
}

#[test]
fn test_caller_cancellation_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..100 {
        fs::write(dir.path().join(format!("f{i:03}.txt")), "x").unwrap();
    }
    let engine = engine_over(dir.path(), 1, Arc::new(SlowDecoder(Duration::from_millis(2))));

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            token.cancel();
        })
    };

    let report = engine
        .search(parse_matcher("content:x").unwrap(), SearchOptions::default(), &token)
        .into_report();
    canceller.join().unwrap();

    assert_eq!(report.status, SearchStatus::Cancelled);
    assert!(matches!(report.error, Some(VfsError::Cancelled)));
    assert!(report.hits.len() < 100);
}
