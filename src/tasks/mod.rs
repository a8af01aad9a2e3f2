//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a store is open.
//!
//! # Tasks
//! - TTL Sweep: Removes expired entries in bounded batches at a fixed interval

mod sweep;

pub use sweep::SweepTask;
pub(crate) use sweep::{spawn_sweep_task, Sweep};
