//! Cache Capability Contract
//!
//! The operation set every backend and decorator implements.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::Context;
use crate::error::Result;

// == Cache Trait ==
/// Uniform `set` / `get` / `delete` contract.
///
/// Decorators hold an `Arc<dyn Cache<V>>` and forward or intercept calls.
#[async_trait]
pub trait Cache<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// Stores `value` under `key`, replacing any prior entry.
    ///
    /// A zero `ttl` stores an entry that is already expired; pass
    /// [`NEVER_EXPIRE`](crate::cache::NEVER_EXPIRE) for an entry without a deadline.
    async fn set(&self, ctx: &Context, key: &str, value: V, ttl: Duration) -> Result<()>;

    /// Returns the live value for `key`, or `KeyNotFound`.
    async fn get(&self, ctx: &Context, key: &str) -> Result<V>;

    /// Removes `key` if present. Absence is not an error.
    async fn delete(&self, ctx: &Context, key: &str) -> Result<()>;
}

#[async_trait]
impl<V, C> Cache<V> for Arc<C>
where
    V: Clone + Send + Sync + 'static,
    C: Cache<V> + ?Sized,
{
    async fn set(&self, ctx: &Context, key: &str, value: V, ttl: Duration) -> Result<()> {
        (**self).set(ctx, key, value, ttl).await
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<V> {
        (**self).get(ctx, key).await
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        (**self).delete(ctx, key).await
    }
}
