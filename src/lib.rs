//! Mini Cache - A composable in-memory cache
//!
//! Provides a TTL store with lazy and background expiration, a
//! capacity-bounded store, and read-through / write-through decorators, all
//! behind one async `Cache` contract.

pub mod backends;
pub mod cache;
pub mod config;
pub mod decorators;
pub mod error;
pub mod tasks;

pub use cache::{BoundedStore, Cache, Context, TtlStore, NEVER_EXPIRE};
pub use config::Config;
pub use decorators::{ReadThroughCache, WriteThroughCache};
pub use error::{CacheError, Result};
