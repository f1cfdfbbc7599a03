use crate::error::Result;
use crate::search::CancellationToken;
use crate::vfs::{Entry, FolderId, LazyTree};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Built-in listing orders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortKey {
    #[default]
    Name,
    Size,
    Hash,
    /// Folders first, then by name
    Kind,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "size" => Ok(SortKey::Size),
            "hash" => Ok(SortKey::Hash),
            "kind" | "type" => Ok(SortKey::Kind),
            other => Err(format!("unknown sort key {other:?} (expected name, size, hash or kind)")),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortKey::Name => "name",
            SortKey::Size => "size",
            SortKey::Hash => "hash",
            SortKey::Kind => "kind",
        };
        f.write_str(name)
    }
}

/// One row of a folder listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub entry: Entry,
    pub name: String,
    pub hash: u32,
    /// `None` for folders
    pub size: Option<u64>,
}

impl ListedEntry {
    pub fn is_folder(&self) -> bool {
        self.entry.is_folder()
    }
}

/// Case-insensitive name order with a case-sensitive tiebreak
fn name_cmp(a: &ListedEntry, b: &ListedEntry) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
}

/// Compare two rows by `key`.
///
/// Descending reverses the whole order, except that `Kind` keeps folders
/// first and only reverses names within each group.
pub fn compare(a: &ListedEntry, b: &ListedEntry, key: SortKey, descending: bool) -> Ordering {
    let flip = |o: Ordering| if descending { o.reverse() } else { o };
    match key {
        SortKey::Name => flip(name_cmp(a, b)),
        SortKey::Size => flip(a.size.cmp(&b.size).then_with(|| name_cmp(a, b))),
        SortKey::Hash => flip(a.hash.cmp(&b.hash)),
        SortKey::Kind => b
            .is_folder()
            .cmp(&a.is_folder())
            .then_with(|| flip(name_cmp(a, b))),
    }
}

/// Sorts folder listings on the sort pool
#[derive(Clone)]
pub struct SortEngine {
    tree: Arc<LazyTree>,
    pool: Arc<ThreadPool>,
}

impl SortEngine {
    pub fn new(tree: Arc<LazyTree>, pool: Arc<ThreadPool>) -> Self {
        Self { tree, pool }
    }

    /// Children of `folder` in enumeration order, materializing it if needed
    pub fn list(&self, folder: FolderId, token: &CancellationToken) -> Result<Vec<ListedEntry>> {
        token.check()?;
        let folders = self.tree.child_folders(folder)?;
        let files = self.tree.child_files(folder)?;

        let mut entries = Vec::with_capacity(folders.len() + files.len());
        entries.extend(folders.iter().map(|f| ListedEntry {
            entry: Entry::Folder(f.id),
            name: f.name.clone(),
            hash: f.hash,
            size: None,
        }));
        entries.extend(files.iter().map(|f| ListedEntry {
            entry: Entry::File(f.id),
            name: f.name.clone(),
            hash: f.hash,
            size: Some(f.size),
        }));
        Ok(entries)
    }

    /// List `folder` and sort it by a built-in key
    pub fn sort(
        &self,
        folder: FolderId,
        key: SortKey,
        descending: bool,
        token: &CancellationToken,
    ) -> Result<Vec<ListedEntry>> {
        let entries = self.list(folder, token)?;
        self.sort_by(entries, |a, b| compare(a, b, key, descending), token)
    }

    /// Stable sort with a caller-supplied comparator
    pub fn sort_by<F>(&self, mut entries: Vec<ListedEntry>, cmp: F, token: &CancellationToken) -> Result<Vec<ListedEntry>>
    where
        F: Fn(&ListedEntry, &ListedEntry) -> Ordering + Sync,
    {
        token.check()?;
        self.pool.install(|| entries.par_sort_by(|a, b| cmp(a, b)));
        token.check()?;
        Ok(entries)
    }
}
