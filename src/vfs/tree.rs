use crate::error::{Result, VfsError};
use crate::hashdb::{EntryKind, HashDatabase};
use crate::utils::{split_path, PathHasher, ROOT_HASH, SEPARATOR};
use crate::vfs::backing::ByteRangeProvider;
use crate::vfs::entry::*;
use crate::vfs::lookup::{FileDecoder, FileLookup};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Node storage. Handles index into these vectors and are never reused.
#[derive(Default)]
struct Arena {
    folders: Vec<Arc<VirtualFolder>>,
    files: Vec<Arc<VirtualFile>>,
}

/// Directory hierarchy rebuilt lazily from a hash database.
///
/// A folder's children are computed the first time anyone asks for them and
/// memoized for the tree's lifetime. Concurrent first access from several
/// workers materializes a folder exactly once.
pub struct LazyTree {
    db: Arc<HashDatabase>,
    store: Arc<dyn ByteRangeProvider>,
    arena: RwLock<Arena>,
    materializations: AtomicUsize,
}

impl LazyTree {
    pub fn new(db: Arc<HashDatabase>, store: Arc<dyn ByteRangeProvider>) -> Self {
        let root = Arc::new(VirtualFolder::new(FolderId(0), ROOT_HASH, String::new(), None));
        Self {
            db,
            store,
            arena: RwLock::new(Arena {
                folders: vec![root],
                files: Vec::new(),
            }),
            materializations: AtomicUsize::new(0),
        }
    }

    pub fn root(&self) -> FolderId {
        FolderId(0)
    }

    pub fn database(&self) -> &HashDatabase {
        &self.db
    }

    pub fn store(&self) -> &dyn ByteRangeProvider {
        self.store.as_ref()
    }

    pub fn folder(&self, id: FolderId) -> Option<Arc<VirtualFolder>> {
        self.arena.read().folders.get(id.index()).cloned()
    }

    pub fn file(&self, id: FileId) -> Option<Arc<VirtualFile>> {
        self.arena.read().files.get(id.index()).cloned()
    }

    /// Children of `id`, materializing them on first call
    pub fn children(&self, id: FolderId) -> Result<Arc<FolderChildren>> {
        let folder = self
            .folder(id)
            .ok_or_else(|| VfsError::not_found(format!("folder #{}", id.index())))?;
        let children = folder.children.get_or_init(|| self.materialize(&folder));
        Ok(Arc::clone(children))
    }

    pub fn is_materialized(&self, id: FolderId) -> bool {
        self.folder(id).is_some_and(|f| f.is_materialized())
    }

    /// Number of folders materialized so far
    pub fn materialization_count(&self) -> usize {
        self.materializations.load(Ordering::Relaxed)
    }

    /// Number of nodes allocated so far, folders and files
    pub fn node_count(&self) -> (usize, usize) {
        let arena = self.arena.read();
        (arena.folders.len(), arena.files.len())
    }

    /// Materialized child folders of `id`, in enumeration order
    pub fn child_folders(&self, id: FolderId) -> Result<Vec<Arc<VirtualFolder>>> {
        let children = self.children(id)?;
        let arena = self.arena.read();
        Ok(children
            .folders
            .iter()
            .filter_map(|f| arena.folders.get(f.index()).cloned())
            .collect())
    }

    /// Materialized files directly inside `id`, in enumeration order
    pub fn child_files(&self, id: FolderId) -> Result<Vec<Arc<VirtualFile>>> {
        let children = self.children(id)?;
        let arena = self.arena.read();
        Ok(children
            .files
            .iter()
            .filter_map(|f| arena.files.get(f.index()).cloned())
            .collect())
    }

    /// Only called from inside the folder's once-cell
    fn materialize(&self, folder: &VirtualFolder) -> Arc<FolderChildren> {
        // Scan without touching the arena lock
        let mut new_folders = Vec::new();
        let mut new_files = Vec::new();
        for record in self.db.children_of(folder.hash) {
            if record.path_hash == folder.hash {
                continue;
            }
            match record.kind {
                EntryKind::Folder => new_folders.push((record.path_hash, record.name.to_string())),
                EntryKind::File => new_files.push((
                    record.path_hash,
                    record.name.to_string(),
                    Locator {
                        segment: record.segment,
                        offset: record.offset,
                        size: record.size,
                    },
                )),
            }
        }

        let mut children = FolderChildren {
            folders: Vec::with_capacity(new_folders.len()),
            files: Vec::with_capacity(new_files.len()),
            by_hash: FxHashMap::default(),
        };

        {
            let mut arena = self.arena.write();
            for (hash, name) in new_folders {
                let id = FolderId(arena.folders.len() as u32);
                arena
                    .folders
                    .push(Arc::new(VirtualFolder::new(id, hash, name, Some(folder.id))));
                children.folders.push(id);
                children.by_hash.insert(hash, Entry::Folder(id));
            }
            for (hash, name, locator) in new_files {
                let id = FileId(arena.files.len() as u32);
                arena.files.push(Arc::new(VirtualFile {
                    id,
                    hash,
                    name,
                    folder: folder.id,
                    size: locator.size,
                    locator,
                }));
                children.files.push(id);
                children.by_hash.insert(hash, Entry::File(id));
            }
        }

        self.materializations.fetch_add(1, Ordering::Relaxed);
        trace!(
            folder = folder.id.index(),
            folders = children.folders.len(),
            files = children.files.len(),
            "materialized folder"
        );
        Arc::new(children)
    }

    /// Resolve a `/`-separated path from the root.
    ///
    /// Each prefix hash extends the previous one instead of rehashing the
    /// whole prefix. An empty path resolves to the root.
    pub fn find(&self, path: &str) -> Result<Entry> {
        let mut hasher = PathHasher::new();
        let mut current = Entry::Folder(self.root());
        let mut resolved = String::new();

        for segment in split_path(path) {
            let Entry::Folder(folder) = current else {
                return Err(VfsError::not_found(format!("{resolved} is a file, not a folder")));
            };
            hasher.push(segment);
            if !resolved.is_empty() {
                resolved.push(SEPARATOR);
            }
            resolved.push_str(segment);

            let children = self.children(folder)?;
            current = children
                .lookup(hasher.finish())
                .ok_or_else(|| VfsError::not_found(resolved.clone()))?;
        }

        debug!(path, "resolved path");
        Ok(current)
    }

    /// Full virtual path of an entry, in its recorded case
    pub fn path_of(&self, entry: Entry) -> Option<String> {
        let arena = self.arena.read();
        let mut segments = Vec::new();
        let mut next = match entry {
            Entry::File(id) => {
                let file = arena.files.get(id.index())?;
                segments.push(file.name.as_str());
                Some(file.folder)
            }
            Entry::Folder(id) => Some(id),
        };

        while let Some(id) = next {
            let folder = arena.folders.get(id.index())?;
            if !folder.is_root() {
                segments.push(folder.name.as_str());
            }
            next = folder.parent;
        }

        segments.reverse();
        Some(segments.join("/"))
    }

    /// Hash of an entry's full path
    pub fn hash_of(&self, entry: Entry) -> Option<u32> {
        match entry {
            Entry::Folder(id) => self.folder(id).map(|f| f.hash),
            Entry::File(id) => self.file(id).map(|f| f.hash),
        }
    }

    /// Open a scoped content handle for `file`
    pub fn lookup<'d>(&self, file: &VirtualFile, decoder: &'d dyn FileDecoder) -> Result<FileLookup<'d>> {
        let path = self
            .path_of(Entry::File(file.id))
            .ok_or_else(|| VfsError::not_found(file.name.clone()))?;
        FileLookup::open(self.store.as_ref(), decoder, &path, file.locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashdb::{HashDbWriter, SourceEntry};
    use crate::utils::hash_path;
    use crate::vfs::backing::DirectoryStore;

    fn tree(paths: &[&str]) -> LazyTree {
        let mut writer = HashDbWriter::new();
        for path in paths {
            writer.add_entry(&SourceEntry {
                path: path.to_string(),
                size: path.len() as u64,
                offset: 0,
                segment: 0,
            });
        }
        let mut image = Vec::new();
        writer.finish(&mut image).unwrap();
        let db = HashDatabase::from_bytes(image).unwrap();
        LazyTree::new(Arc::new(db), Arc::new(DirectoryStore::new("/nonexistent")))
    }

    #[test]
    fn test_root_lazy_until_enumerated() {
        let tree = tree(&["a/b.txt"]);
        assert!(!tree.is_materialized(tree.root()));
        assert_eq!(tree.materialization_count(), 0);

        let children = tree.children(tree.root()).unwrap();
        assert_eq!(children.folders.len(), 1);
        assert!(children.files.is_empty());
        assert!(tree.is_materialized(tree.root()));
        assert_eq!(tree.materialization_count(), 1);
    }

    #[test]
    fn test_children_memoized() {
        let tree = tree(&["a/b.txt", "c.txt"]);
        let first = tree.children(tree.root()).unwrap();
        let second = tree.children(tree.root()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(tree.materialization_count(), 1);
        assert_eq!(tree.node_count(), (2, 1));
    }

    #[test]
    fn test_find_file_and_path_of() {
        let tree = tree(&["Chara/Equipment/e0001/top.mdl", "chara/readme.txt"]);
        let entry = tree.find("chara/equipment/E0001/TOP.MDL").unwrap();
        let file = tree.file(entry.as_file().unwrap()).unwrap();

        assert_eq!(file.name, "top.mdl");
        assert_eq!(file.hash, hash_path("chara/equipment/e0001/top.mdl"));
        assert_eq!(tree.path_of(entry).unwrap(), "Chara/Equipment/e0001/top.mdl");
    }

    #[test]
    fn test_find_empty_path_is_root() {
        let tree = tree(&["x.txt"]);
        assert_eq!(tree.find("").unwrap(), Entry::Folder(tree.root()));
        assert_eq!(tree.path_of(Entry::Folder(tree.root())).unwrap(), "");
    }

    #[test]
    fn test_find_missing_names_segment() {
        let tree = tree(&["a/b/c.txt"]);
        let err = tree.find("a/x/c.txt").unwrap_err();
        match err {
            VfsError::NotFound(what) => assert_eq!(what, "a/x"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_find_through_file_fails() {
        let tree = tree(&["a/b.txt"]);
        assert!(matches!(tree.find("a/b.txt/c"), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_unknown_folder_has_no_children() {
        let tree = tree(&["a/b.txt"]);
        assert!(tree.children(FolderId(99)).is_err());

        let entry = tree.find("a").unwrap();
        let a = entry.as_folder().unwrap();
        assert!(tree.child_folders(a).unwrap().is_empty());
        assert_eq!(tree.child_files(a).unwrap().len(), 1);
    }

    #[test]
    fn test_parent_links() {
        let tree = tree(&["a/b/c.txt"]);
        let b = tree.find("a/b").unwrap().as_folder().unwrap();
        let a = tree.find("a").unwrap().as_folder().unwrap();
        assert_eq!(tree.folder(b).unwrap().parent, Some(a));
        assert_eq!(tree.folder(a).unwrap().parent, Some(tree.root()));
    }
}
