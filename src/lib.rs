//! # packscope - browse and search hash-indexed archives
//!
//! Large game archives address their files by a hash of the full path, not
//! by name. packscope keeps a persistent hash database next to the archive,
//! rebuilds the folder hierarchy from it on demand and runs a small query
//! language over the result.
//!
//! ## Architecture
//!
//! - [`hashdb`] - path-hash records, the on-disk cache and its builder
//! - [`vfs`] - the lazily materialized read-only tree and its byte stores
//! - [`query`] - matcher trees and the query parser
//! - [`search`] - concurrent search, sorting and previews on worker pools
//! - [`config`] - runtime settings
//! - [`output`] - terminal formatting
//! - [`utils`] - path hashing, binary sniffing, app data paths
//!
//! ## Quick Start
//!
//! ```no_run
//! use packscope::query::parse_matcher;
//! use packscope::search::{CancellationToken, SearchEngine, SearchOptions};
//! use packscope::vfs::{mount_directory, TextDecoder};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let tree = Arc::new(mount_directory(Path::new("/path/to/extracted")).unwrap());
//! let pool = Arc::new(rayon::ThreadPoolBuilder::new().build().unwrap());
//! let engine = SearchEngine::new(tree, Arc::new(TextDecoder), pool);
//!
//! let matcher = parse_matcher("*.mdl size:>1024").unwrap();
//! let results = engine.search(matcher, SearchOptions::default(), &CancellationToken::new());
//! for hit in results {
//!     println!("{:08x} {}", hit.hash, hit.path);
//! }
//! ```

pub mod config;
pub mod error;
pub mod hashdb;
pub mod output;
pub mod query;
pub mod search;
pub mod utils;
pub mod vfs;

pub use error::{Result, VfsError};
