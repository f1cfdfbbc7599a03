//! Persistent mapping from full-path hash to structural location.
//!
//! The database is built once from a path list, cached to disk in a fixed
//! binary layout and memory-mapped on every later start.

pub mod reader;
pub mod source;
pub mod types;
pub mod writer;

pub use reader::{HashDatabase, RecordRef};
pub use source::{SourceEntry, SourceList, SourceUri};
pub use types::*;
pub use writer::{build, build_from_list, HashDbWriter, ProgressFn};

use crate::error::Result;
use crate::search::CancellationToken;
use std::path::Path;
use tracing::info;

/// Load `cache_path`, building it from `source` first if it is absent or empty.
///
/// A cache that exists but fails validation is an error; it is never
/// replaced behind the caller's back.
pub fn open_or_build(
    cache_path: &Path,
    source: &SourceUri,
    progress: ProgressFn<'_>,
    progress_interval: usize,
    token: &CancellationToken,
) -> Result<HashDatabase> {
    let needs_build = match std::fs::metadata(cache_path) {
        Ok(meta) => meta.len() == 0,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => return Err(e.into()),
    };

    if needs_build {
        info!(cache = %cache_path.display(), source = source.as_str(), "building hash database");
        build(source, cache_path, progress, progress_interval, token)?;
    }

    HashDatabase::open(cache_path)
}
