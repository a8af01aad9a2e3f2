//! Decorators Module
//!
//! Behaviour layered over any [`Cache`](crate::cache::Cache): read-through
//! loading and write-through persistence.

mod read_through;
mod sink;
mod write_through;

pub use read_through::{loader_fn, FnLoader, Loaded, Loader, ReadThroughCache, RefillStrategy};
pub use sink::{LogSink, TracingSink};
pub use write_through::{persister_fn, FnPersister, Persister, WriteStrategy, WriteThroughCache};
