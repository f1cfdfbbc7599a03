//! Read-only virtual filesystem over a hash database and a backing store.
//!
//! - [`entry`] - folder/file nodes and their arena handles
//! - [`backing`] - byte sources: a real directory or numbered pack segments
//! - [`lookup`] - scoped content handles and decoders
//! - [`tree`] - the lazily materialized hierarchy

pub mod backing;
pub mod entry;
pub mod lookup;
pub mod tree;

pub use backing::{ByteRangeProvider, DirectoryStore, PackStore, ReadRequest};
pub use entry::{Entry, FileId, FolderChildren, FolderId, Locator, VirtualFile, VirtualFolder};
pub use lookup::{DecodedResource, FileDecoder, FileLookup, TextDecoder};
pub use tree::LazyTree;

use crate::error::Result;
use crate::hashdb::{HashDatabase, HashDbWriter, SourceList};
use std::path::Path;
use std::sync::Arc;

/// Mount a real directory, indexing it in memory
pub fn mount_directory(root: &Path) -> Result<LazyTree> {
    let list = SourceList::from_directory(root)?;
    let mut writer = HashDbWriter::new();
    for entry in &list.entries {
        writer.add_entry(entry);
    }
    let mut image = Vec::new();
    writer.finish(&mut image)?;

    let db = HashDatabase::from_bytes(image)?;
    Ok(LazyTree::new(Arc::new(db), Arc::new(DirectoryStore::new(root))))
}

/// Mount pack segments `<stem>.datN` described by an existing database
pub fn mount_pack(stem: &Path, db: HashDatabase) -> LazyTree {
    LazyTree::new(Arc::new(db), Arc::new(PackStore::new(stem)))
}
