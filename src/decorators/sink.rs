//! Log Sink Module
//!
//! Destination for errors raised by detached background work.

use tracing::warn;

use crate::error::CacheError;

/// Receives failures that cannot be returned to any caller.
///
/// Implementations must not block or panic.
pub trait LogSink: Send + Sync {
    fn log(&self, key: &str, err: &CacheError);
}

impl<F> LogSink for F
where
    F: Fn(&str, &CacheError) + Send + Sync,
{
    fn log(&self, key: &str, err: &CacheError) {
        self(key, err)
    }
}

/// Forwards background failures to `tracing` at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, key: &str, err: &CacheError) {
        warn!(key = %key, error = %err, "Background cache operation failed");
    }
}
