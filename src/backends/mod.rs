//! Backends Module
//!
//! Cache implementations backed by stores outside this process.

mod remote;

pub use remote::{KvClient, RemoteCache, OK_REPLY};
