use crate::hashdb::SegmentId;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Arena handle of a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FolderId(pub(crate) u32);

/// Arena handle of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub(crate) u32);

impl FolderId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl FileId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Either kind of tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entry {
    Folder(FolderId),
    File(FileId),
}

impl Entry {
    pub fn as_folder(self) -> Option<FolderId> {
        match self {
            Entry::Folder(id) => Some(id),
            Entry::File(_) => None,
        }
    }

    pub fn as_file(self) -> Option<FileId> {
        match self {
            Entry::File(id) => Some(id),
            Entry::Folder(_) => None,
        }
    }

    pub fn is_folder(self) -> bool {
        matches!(self, Entry::Folder(_))
    }
}

/// Where a file's bytes live; only the backing store interprets it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Locator {
    pub segment: SegmentId,
    pub offset: u64,
    pub size: u64,
}

/// Children of a materialized folder, in canonical record order
#[derive(Debug, Default)]
pub struct FolderChildren {
    pub folders: Vec<FolderId>,
    pub files: Vec<FileId>,
    pub(crate) by_hash: FxHashMap<u32, Entry>,
}

impl FolderChildren {
    /// Child whose full path hash is `hash`
    pub fn lookup(&self, hash: u32) -> Option<Entry> {
        self.by_hash.get(&hash).copied()
    }

    pub fn len(&self) -> usize {
        self.folders.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.files.is_empty()
    }

    /// Folders first, then files
    pub fn entries(&self) -> impl Iterator<Item = Entry> + '_ {
        self.folders
            .iter()
            .map(|&id| Entry::Folder(id))
            .chain(self.files.iter().map(|&id| Entry::File(id)))
    }
}

/// A directory node.
///
/// The parent is a handle, never an owning pointer. `children` is written
/// exactly once, on first enumeration.
pub struct VirtualFolder {
    pub id: FolderId,
    pub hash: u32,
    pub name: String,
    pub parent: Option<FolderId>,
    pub(crate) children: OnceLock<Arc<FolderChildren>>,
}

impl VirtualFolder {
    pub(crate) fn new(id: FolderId, hash: u32, name: String, parent: Option<FolderId>) -> Self {
        Self {
            id,
            hash,
            name,
            parent,
            children: OnceLock::new(),
        }
    }

    /// Children if already materialized; never triggers materialization
    pub fn children_if_materialized(&self) -> Option<&Arc<FolderChildren>> {
        self.children.get()
    }

    pub fn is_materialized(&self) -> bool {
        self.children.get().is_some()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

impl fmt::Debug for VirtualFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualFolder")
            .field("id", &self.id)
            .field("hash", &format_args!("{:08x}", self.hash))
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

/// A leaf entry; immutable once constructed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    pub id: FileId,
    pub hash: u32,
    pub name: String,
    pub folder: FolderId,
    pub size: u64,
    pub locator: Locator,
}
