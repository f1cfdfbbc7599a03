use crate::config::Settings;
use crate::error::{Result, VfsError};
use crate::query::{EntryFacts, Matcher};
use crate::search::{CancellationToken, Deadline};
use crate::vfs::{Entry, FileDecoder, FileLookup, FolderId, LazyTree, VirtualFile, VirtualFolder};
use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Hits buffered between the walker and the consumer
const CHANNEL_CAPACITY: usize = 256;

/// Per-query options
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Whole-query budget; `None` is unbounded
    pub timeout: Option<Duration>,
    /// Also report folders whose name-level predicates match
    pub include_folders: bool,
    /// Stop after this many hits
    pub limit: Option<usize>,
}

impl SearchOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            timeout: settings.query_timeout(),
            ..Self::default()
        }
    }
}

/// A matching entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub entry: Entry,
    pub path: String,
    pub name: String,
    pub hash: u32,
    /// `None` for folders
    pub size: Option<u64>,
}

impl SearchHit {
    fn file(file: &VirtualFile, path: String) -> Self {
        Self {
            entry: Entry::File(file.id),
            path,
            name: file.name.clone(),
            hash: file.hash,
            size: Some(file.size),
        }
    }

    fn folder(folder: &VirtualFolder, path: String) -> Self {
        Self {
            entry: Entry::Folder(folder.id),
            path,
            name: folder.name.clone(),
            hash: folder.hash,
            size: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.entry.is_folder()
    }
}

/// How a search ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    /// Every entry was visited, or the hit limit was reached
    Complete,
    Cancelled,
    TimedOut,
}

/// Counters for one search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub folders_visited: usize,
    /// Entries whose evaluation ran to an answer (match, miss or failure)
    pub evaluated: usize,
    pub matched: usize,
    /// Entries whose evaluation failed and were counted as non-matching
    pub failed: usize,
}

enum Event {
    Hit(SearchHit),
    Finished {
        status: SearchStatus,
        stats: SearchStats,
        error: Option<VfsError>,
        elapsed: Duration,
    },
}

/// Lazy stream of hits.
///
/// Hits arrive in depth-first canonical order. Once the iterator is
/// exhausted, [`status`](Self::status) tells whether the set is complete.
/// Dropping it stops the walk.
pub struct SearchResults {
    rx: Receiver<Event>,
    stop: CancellationToken,
    status: Option<SearchStatus>,
    stats: SearchStats,
    error: Option<VfsError>,
    elapsed: Duration,
}

impl SearchResults {
    /// Terminal status, `None` while hits may still arrive
    pub fn status(&self) -> Option<SearchStatus> {
        self.status
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    /// The timeout or cancellation that ended the search early
    pub fn error(&self) -> Option<&VfsError> {
        self.error.as_ref()
    }

    /// Stop the walk; hits already buffered are still delivered
    pub fn cancel(&self) {
        self.stop.cancel();
    }

    /// Drain every remaining hit
    pub fn into_report(mut self) -> SearchReport {
        let hits: Vec<SearchHit> = self.by_ref().collect();
        SearchReport {
            hits,
            status: self.status.unwrap_or(SearchStatus::Cancelled),
            stats: self.stats,
            error: self.error.take(),
            elapsed: self.elapsed,
        }
    }
}

impl Iterator for SearchResults {
    type Item = SearchHit;

    fn next(&mut self) -> Option<SearchHit> {
        if self.status.is_some() {
            return None;
        }
        match self.rx.recv() {
            Ok(Event::Hit(hit)) => Some(hit),
            Ok(Event::Finished {
                status,
                stats,
                error,
                elapsed,
            }) => {
                self.status = Some(status);
                self.stats = stats;
                self.error = error;
                self.elapsed = elapsed;
                None
            }
            Err(_) => {
                // Walker vanished without reporting
                self.status = Some(SearchStatus::Cancelled);
                self.error = Some(VfsError::Cancelled);
                None
            }
        }
    }
}

impl Drop for SearchResults {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Every hit of a finished search plus how it ended
#[derive(Debug)]
pub struct SearchReport {
    pub hits: Vec<SearchHit>,
    pub status: SearchStatus,
    pub stats: SearchStats,
    pub error: Option<VfsError>,
    pub elapsed: Duration,
}

impl SearchReport {
    /// False when the hits are a partial set
    pub fn is_complete(&self) -> bool {
        self.status == SearchStatus::Complete
    }
}

/// Runs matchers over a lazy tree on the search pool
#[derive(Clone)]
pub struct SearchEngine {
    tree: Arc<LazyTree>,
    decoder: Arc<dyn FileDecoder>,
    pool: Arc<ThreadPool>,
}

impl SearchEngine {
    pub fn new(tree: Arc<LazyTree>, decoder: Arc<dyn FileDecoder>, pool: Arc<ThreadPool>) -> Self {
        Self { tree, decoder, pool }
    }

    pub fn tree(&self) -> &Arc<LazyTree> {
        &self.tree
    }

    /// Search the whole tree. Returns immediately; the walk runs on the pool.
    pub fn search(&self, matcher: Matcher, options: SearchOptions, token: &CancellationToken) -> SearchResults {
        self.search_from(self.tree.root(), matcher, options, token)
    }

    /// Search below `start`
    pub fn search_from(
        &self,
        start: FolderId,
        matcher: Matcher,
        options: SearchOptions,
        token: &CancellationToken,
    ) -> SearchResults {
        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        let stop = CancellationToken::new();
        let start_path = self.tree.path_of(Entry::Folder(start)).unwrap_or_default();

        let walk = Walk {
            tree: Arc::clone(&self.tree),
            decoder: Arc::clone(&self.decoder),
            matcher: matcher.unwrap_if_possible(),
            deadline: Deadline::start(options.timeout),
            options,
            caller: token.clone(),
            stop: stop.clone(),
            tx,
            stats: SearchStats::default(),
        };
        debug!(matcher = %walk.matcher, "search started");
        self.pool.spawn(move || walk.run(start, start_path));

        SearchResults {
            rx,
            stop,
            status: None,
            stats: SearchStats::default(),
            error: None,
            elapsed: Duration::ZERO,
        }
    }
}

enum Outcome {
    Hit(String),
    Miss,
    Failed,
    Terminal(VfsError),
}

/// State of one running search
struct Walk {
    tree: Arc<LazyTree>,
    decoder: Arc<dyn FileDecoder>,
    matcher: Matcher,
    deadline: Deadline,
    options: SearchOptions,
    caller: CancellationToken,
    stop: CancellationToken,
    tx: Sender<Event>,
    stats: SearchStats,
}

impl Walk {
    fn run(mut self, start: FolderId, start_path: String) {
        let (status, error) = match self.walk(start, start_path) {
            Ok(()) => (SearchStatus::Complete, None),
            Err(e @ VfsError::Timeout { .. }) => (SearchStatus::TimedOut, Some(e)),
            Err(e) => (SearchStatus::Cancelled, Some(e)),
        };
        let elapsed = self.deadline.elapsed();

        info!(
            ?status,
            evaluated = self.stats.evaluated,
            matched = self.stats.matched,
            failed = self.stats.failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "search finished"
        );
        // The consumer may already be gone
        let _ = self.tx.send(Event::Finished {
            status,
            stats: self.stats,
            error,
            elapsed,
        });
    }

    fn is_stopped(&self) -> bool {
        self.caller.is_cancelled() || self.stop.is_cancelled()
    }

    fn check(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(VfsError::Cancelled);
        }
        self.deadline.check()
    }

    /// Pre-order depth-first walk; each folder's files form one parallel batch
    fn walk(&mut self, start: FolderId, start_path: String) -> Result<()> {
        let mut stack = vec![(start, start_path)];

        while let Some((folder, path)) = stack.pop() {
            self.check()?;
            self.stats.folders_visited += 1;

            let (subfolders, files) = match (self.tree.child_folders(folder), self.tree.child_files(folder)) {
                (Ok(folders), Ok(files)) => (folders, files),
                (Err(e), _) | (_, Err(e)) => {
                    debug!(path = %path, error = %e, "skipping unreadable folder");
                    continue;
                }
            };

            if self.options.include_folders {
                for sub in &subfolders {
                    let sub_path = join_path(&path, &sub.name);
                    let facts = EntryFacts::folder(&sub.name, &sub_path, sub.hash);
                    match self.matcher.evaluate_folder(&facts, &self.deadline) {
                        Ok(matched) => {
                            self.stats.evaluated += 1;
                            if matched && !self.emit(SearchHit::folder(sub, sub_path))? {
                                return Ok(());
                            }
                        }
                        Err(e) if e.is_terminal() => return Err(e),
                        Err(e) => {
                            debug!(path = %sub_path, error = %e, "folder evaluation failed");
                            self.stats.evaluated += 1;
                            self.stats.failed += 1;
                        }
                    }
                }
            }

            let outcomes: Vec<Outcome> = files
                .par_iter()
                .map(|file| self.evaluate_file(file, &path))
                .collect();

            // Report what the batch found before surfacing a terminal error
            let mut terminal = None;
            for (file, outcome) in files.iter().zip(outcomes) {
                match outcome {
                    Outcome::Hit(file_path) => {
                        self.stats.evaluated += 1;
                        if !self.emit(SearchHit::file(file, file_path))? {
                            return Ok(());
                        }
                    }
                    Outcome::Miss => self.stats.evaluated += 1,
                    Outcome::Failed => {
                        self.stats.evaluated += 1;
                        self.stats.failed += 1;
                    }
                    Outcome::Terminal(e) => {
                        terminal.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = terminal {
                return Err(e);
            }

            for sub in subfolders.iter().rev() {
                stack.push((sub.id, join_path(&path, &sub.name)));
            }
        }

        Ok(())
    }

    fn evaluate_file(&self, file: &VirtualFile, folder_path: &str) -> Outcome {
        if self.is_stopped() {
            return Outcome::Terminal(VfsError::Cancelled);
        }
        if let Err(e) = self.deadline.check() {
            return Outcome::Terminal(e);
        }

        let path = join_path(folder_path, &file.name);
        match self.matches_file(file, &path) {
            Ok(true) => Outcome::Hit(path),
            Ok(false) => Outcome::Miss,
            Err(e) if e.is_terminal() => Outcome::Terminal(e),
            Err(e) => {
                debug!(path = %path, error = %e, "evaluation failed, treating as non-match");
                Outcome::Failed
            }
        }
    }

    /// Metadata first; content is read only when that cannot decide
    fn matches_file(&self, file: &VirtualFile, path: &str) -> Result<bool> {
        let facts = EntryFacts::file(&file.name, path, file.hash, file.size);
        if let Some(decided) = self.matcher.evaluate_metadata(&facts, &self.deadline)? {
            return Ok(decided);
        }

        let mut lookup = FileLookup::open(self.tree.store(), self.decoder.as_ref(), path, file.locator)?;
        let text = lookup.text()?;
        self.deadline.check()?;
        self.matcher.evaluate_with_content(&facts, text, &self.deadline)
    }

    /// Send a hit; `false` once the limit is reached
    fn emit(&mut self, hit: SearchHit) -> Result<bool> {
        if self.options.limit.is_some_and(|limit| self.stats.matched >= limit) {
            return Ok(false);
        }
        self.stats.matched += 1;
        self.tx.send(Event::Hit(hit)).map_err(|_| VfsError::Cancelled)?;
        Ok(self.options.limit.is_none_or(|limit| self.stats.matched < limit))
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_matcher;
    use crate::vfs::{mount_directory, TextDecoder};
    use std::fs;

    fn fixture() -> (tempfile::TempDir, SearchEngine) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("chara/body")).unwrap();
        fs::create_dir_all(root.join("ui/icon")).unwrap();
        fs::write(root.join("chara/body/b0001.mdl"), "vertex data").unwrap();
        fs::write(root.join("chara/body/b0002.mdl"), "index data").unwrap();
        fs::write(root.join("chara/body/b0001.tex"), [0u8, 1, 2, 3]).unwrap();
        fs::write(root.join("ui/icon/000001.tex"), "icon").unwrap();
        fs::write(root.join("readme.txt"), "hello vertex").unwrap();

        let tree = Arc::new(mount_directory(root).unwrap());
        let pool = Arc::new(rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap());
        (dir, SearchEngine::new(tree, Arc::new(TextDecoder), pool))
    }

    fn paths(engine: &SearchEngine, query: &str, options: SearchOptions) -> Vec<String> {
        let report = engine
            .search(parse_matcher(query).unwrap(), options, &CancellationToken::new())
            .into_report();
        assert!(report.is_complete(), "{:?}", report.error);
        report.hits.into_iter().map(|h| h.path).collect()
    }

    #[test]
    fn test_name_search_in_canonical_order() {
        let (_dir, engine) = fixture();
        let found = paths(&engine, "*.mdl", SearchOptions::default());
        assert_eq!(found, vec!["chara/body/b0001.mdl", "chara/body/b0002.mdl"]);
    }

    #[test]
    fn test_content_search_skips_binary() {
        let (_dir, engine) = fixture();
        let found = paths(&engine, "content:vertex", SearchOptions::default());
        // A folder's own files come before its subfolders
        assert_eq!(found, vec!["readme.txt", "chara/body/b0001.mdl"]);
    }

    #[test]
    fn test_undecodable_entry_counts_as_failed() {
        let (_dir, engine) = fixture();
        let report = engine
            .search(parse_matcher("b0001 content:zzz").unwrap(), SearchOptions::default(), &CancellationToken::new())
            .into_report();
        assert!(report.is_complete());
        assert!(report.hits.is_empty());
        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.stats.evaluated, 5);
    }

    #[test]
    fn test_include_folders() {
        let (_dir, engine) = fixture();
        let options = SearchOptions {
            include_folders: true,
            ..SearchOptions::default()
        };
        let found = paths(&engine, "=body", options);
        assert_eq!(found, vec!["chara/body"]);
    }

    #[test]
    fn test_limit() {
        let (_dir, engine) = fixture();
        let options = SearchOptions {
            limit: Some(1),
            ..SearchOptions::default()
        };
        assert_eq!(paths(&engine, "", options).len(), 1);
    }

    #[test]
    fn test_limit_zero() {
        let (_dir, engine) = fixture();
        let options = SearchOptions {
            limit: Some(0),
            ..SearchOptions::default()
        };
        let report = engine
            .search(Matcher::always(), options, &CancellationToken::new())
            .into_report();
        assert!(report.hits.is_empty());
        assert_eq!(report.stats.matched, 0);
        assert!(report.is_complete());
    }

    #[test]
    fn test_search_from_subfolder() {
        let (_dir, engine) = fixture();
        let ui = engine.tree().find("ui").unwrap().as_folder().unwrap();
        let report = engine
            .search_from(ui, Matcher::always(), SearchOptions::default(), &CancellationToken::new())
            .into_report();
        let found: Vec<_> = report.hits.into_iter().map(|h| h.path).collect();
        assert_eq!(found, vec!["ui/icon/000001.tex"]);
    }

    #[test]
    fn test_cancelled_before_start() {
        let (_dir, engine) = fixture();
        let token = CancellationToken::new();
        token.cancel();
        let report = engine.search(Matcher::always(), SearchOptions::default(), &token).into_report();
        assert_eq!(report.status, SearchStatus::Cancelled);
        assert!(report.hits.is_empty());
        assert!(matches!(report.error, Some(VfsError::Cancelled)));
    }

    #[test]
    fn test_zero_timeout_times_out() {
        let (_dir, engine) = fixture();
        let options = SearchOptions {
            timeout: Some(Duration::ZERO),
            ..SearchOptions::default()
        };
        let report = engine
            .search(Matcher::always(), options, &CancellationToken::new())
            .into_report();
        assert_eq!(report.status, SearchStatus::TimedOut);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_status_unknown_until_exhausted() {
        let (_dir, engine) = fixture();
        let mut results = engine.search(Matcher::always(), SearchOptions::default(), &CancellationToken::new());
        assert!(results.status().is_none());
        while results.next().is_some() {}
        assert_eq!(results.status(), Some(SearchStatus::Complete));
        assert_eq!(results.stats().matched, 5);
    }
}
