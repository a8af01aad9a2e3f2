//! Cache Module
//!
//! Provides the cache contract, the in-memory TTL store and the
//! capacity-bounded store built on top of it.

mod bounded;
mod context;
mod contract;
mod entry;
mod stats;
mod store;


// Re-export public types
pub use bounded::BoundedStore;
pub use context::{CancelHandle, Context};
pub use contract::Cache;
pub use entry::{CacheEntry, NEVER_EXPIRE};
pub use stats::CacheStats;
pub use store::{EvictionListener, TtlStore, TtlStoreBuilder};

// == Public Constants ==
/// Default upper bound on expired entries removed by one sweep
pub const DEFAULT_SWEEP_BATCH: usize = 10_000;
