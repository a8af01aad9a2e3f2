//! Remote Backend Module
//!
//! Thin translation of the cache contract onto a remote key-value client.

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{Cache, Context, NEVER_EXPIRE};
use crate::error::{CacheError, Result};

/// Status reply acknowledging a successful write.
pub const OK_REPLY: &str = "OK";

// == Client ==
/// Minimal command set of a remote key-value server.
///
/// The wire protocol lives entirely behind this trait.
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Writes `value`, expiring after `ttl` (None = no expiry). Returns the status reply.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<String>;

    /// Reads a value; None when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Deletes a key, returning the number of keys removed.
    async fn del(&self, key: &str) -> Result<u64>;
}

// == Remote Cache ==
/// [`Cache`] over a [`KvClient`]. Every call runs under the caller's context.
pub struct RemoteCache<C> {
    client: C,
}

impl<C: KvClient> RemoteCache<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<C: KvClient> Cache<String> for RemoteCache<C> {
    async fn set(&self, ctx: &Context, key: &str, value: String, ttl: Duration) -> Result<()> {
        // An already-expired entry is the same as no entry
        if ttl.is_zero() {
            return ctx.run(self.client.del(key)).await.map(|_| ());
        }

        let expiry = (ttl != NEVER_EXPIRE).then_some(ttl);
        let reply = ctx.run(self.client.set(key, &value, expiry)).await?;
        if reply != OK_REPLY {
            return Err(CacheError::SetFailed(format!("rsp: {}", reply)));
        }
        Ok(())
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<String> {
        ctx.run(self.client.get(key))
            .await?
            .ok_or_else(|| CacheError::KeyNotFound(key.to_string()))
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        ctx.run(self.client.del(key)).await.map(|_| ())
    }
}
