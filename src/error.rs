//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type shared by every backend and decorator.
///
/// Errors are `Clone` so that a single coalesced load can hand the same
/// outcome to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key is absent or its entry has expired
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Capacity-bounded store refused a new key
    #[error("Over capacity: limit of {max} keys reached, rejected {key}")]
    OverCapacity { key: String, max: usize },

    /// A store handed to a bounded wrapper already holds too many keys
    #[error("Store already holds {present} keys, limit is {max}")]
    ExceedsCapacity { present: usize, max: usize },

    /// Backend answered a write with something other than an acknowledgement
    #[error("Set failed: {0}")]
    SetFailed(String),

    /// Transport, loader or persistence failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// The caller's context was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// The caller's context deadline passed
    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl CacheError {
    /// Returns true for the absence error that triggers a read-through load.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::KeyNotFound(_))
    }

    /// Wraps any displayable failure as a backend error.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        CacheError::Backend(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
