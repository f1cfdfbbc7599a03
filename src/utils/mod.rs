//! Utility functions shared across the crate.
//!
//! ## Modules
//!
//! - [`app_data`] - Application data directory management (XDG-compliant)
//! - [`encoding`] - Little-endian read/write helpers for the cache layout
//! - [`path_hash`] - Path normalization and incremental CRC-32 path hashing
//! - [`progress`] - Progress bars (no-op without the `progress` feature)
//! - [`sniff`] - Binary content detection and type hints
//!
//! ```no_run
//! use packscope::utils::{hash_path, PathHasher};
//!
//! let mut hasher = PathHasher::new();
//! hasher.push("common");
//! hasher.push("font");
//! assert_eq!(hasher.finish(), hash_path("common/font"));
//! ```

pub mod app_data;
pub mod encoding;
pub mod path_hash;
pub mod progress;
pub mod sniff;

pub use app_data::*;
pub use encoding::*;
pub use path_hash::*;
pub use sniff::*;
