//! Error taxonomy shared by the hash database, the virtual tree and the
//! search engine.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T, E = VfsError> = std::result::Result<T, E>;

/// Errors raised by the virtual filesystem and its engines
#[derive(Debug, Error)]
pub enum VfsError {
    /// A path or hash has no record
    #[error("not found: {0}")]
    NotFound(String),

    /// The query budget ran out
    #[error("timed out after {elapsed:?} (budget {budget:?})")]
    Timeout { elapsed: Duration, budget: Duration },

    /// The hash database cache failed structural validation
    #[error("corrupt hash database: {0}")]
    Corruption(String),

    /// The backing store could not be read or written
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    /// Content could not be decoded
    #[error("cannot decode {type_hint:?} content: {reason}")]
    Format { type_hint: String, reason: String },

    /// A cancellation token was observed
    #[error("operation cancelled")]
    Cancelled,

    /// The source list could not be fetched
    #[error("cannot fetch {uri}: {reason}")]
    Network { uri: String, reason: String },

    /// The source list is malformed
    #[error("malformed source list at line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

impl VfsError {
    /// Errors that end a whole query rather than a single entry
    pub fn is_terminal(&self) -> bool {
        matches!(self, VfsError::Timeout { .. } | VfsError::Cancelled)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        VfsError::NotFound(what.into())
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        VfsError::Corruption(what.into())
    }
}
