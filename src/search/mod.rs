//! Concurrent search, sort and preview generation over a lazy tree.
//!
//! Every entry point takes a [`CancellationToken`]; whole-query budgets are
//! absolute [`Deadline`]s fixed when the query starts.

pub mod cancel;
pub mod deadline;
pub mod engine;
pub mod pool;
pub mod sort;
pub mod thumbnail;

pub use cancel::CancellationToken;
pub use deadline::Deadline;
pub use engine::{SearchEngine, SearchHit, SearchOptions, SearchReport, SearchResults, SearchStats, SearchStatus};
pub use pool::WorkerPools;
pub use sort::{compare, ListedEntry, SortEngine, SortKey};
pub use thumbnail::{Thumbnail, ThumbnailCache};
