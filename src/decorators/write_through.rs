//! Write-Through Decorator
//!
//! Persists every write to a system of record before refilling the wrapped cache.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::cache::{Cache, Context};
use crate::decorators::{LogSink, TracingSink};
use crate::error::Result;

// == Persister ==
/// Durable system of record behind a write-through cache.
#[async_trait]
pub trait Persister<V>: Send + Sync {
    async fn store(&self, ctx: &Context, key: &str, value: &V) -> Result<()>;
}

/// Adapts an async closure `(Context, String, V) -> Result<()>` into a [`Persister`].
pub struct FnPersister<F, V> {
    f: F,
    _value: PhantomData<fn(V)>,
}

pub fn persister_fn<F, Fut, V>(f: F) -> FnPersister<F, V>
where
    F: Fn(Context, String, V) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnPersister {
        f,
        _value: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, V> Persister<V> for FnPersister<F, V>
where
    F: Fn(Context, String, V) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn store(&self, ctx: &Context, key: &str, value: &V) -> Result<()> {
        (self.f)(ctx.clone(), key.to_string(), value.clone()).await
    }
}

// == Write Strategy ==
/// How the cache layer is refilled after a successful persist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteStrategy {
    /// Refill inline and return its result
    #[default]
    Sync,
    /// Refill from a detached task; failures are only logged
    Async,
}

// == Write-Through Cache ==
/// Decorator that writes to a [`Persister`] first and the inner cache second.
///
/// A failed persist is returned unchanged and never touches the cache.
pub struct WriteThroughCache<V> {
    inner: Arc<dyn Cache<V>>,
    persister: Arc<dyn Persister<V>>,
    sink: Arc<dyn LogSink>,
    strategy: WriteStrategy,
}

impl<V> WriteThroughCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(inner: Arc<dyn Cache<V>>, persister: Arc<dyn Persister<V>>) -> Self {
        Self {
            inner,
            persister,
            sink: Arc::new(TracingSink),
            strategy: WriteStrategy::default(),
        }
    }

    /// Replaces the default tracing sink.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Selects the strategy used by [`Cache::set`].
    pub fn with_strategy(mut self, strategy: WriteStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> WriteStrategy {
        self.strategy
    }

    // == Synchronous Write ==
    /// Persists, then refills the cache and returns the refill's result.
    pub async fn set_sync(&self, ctx: &Context, key: &str, value: V, ttl: Duration) -> Result<()> {
        ctx.run(self.persister.store(ctx, key, &value)).await?;
        self.inner.set(ctx, key, value, ttl).await
    }

    // == Asynchronous Write ==
    /// Persists, then returns while the cache is refilled in the background.
    ///
    /// Reads may miss the new value until the detached refill lands.
    pub async fn set_async(&self, ctx: &Context, key: &str, value: V, ttl: Duration) -> Result<()> {
        ctx.run(self.persister.store(ctx, key, &value)).await?;

        let inner = self.inner.clone();
        let sink = self.sink.clone();
        let owned_key = key.to_string();
        tokio::spawn(async move {
            if let Err(err) = inner.set(&Context::background(), &owned_key, value, ttl).await {
                sink.log(&owned_key, &err);
            }
        });

        debug!(key = %key, "Persisted, cache refill detached");
        Ok(())
    }
}

#[async_trait]
impl<V> Cache<V> for WriteThroughCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn set(&self, ctx: &Context, key: &str, value: V, ttl: Duration) -> Result<()> {
        match self.strategy {
            WriteStrategy::Sync => self.set_sync(ctx, key, value, ttl).await,
            WriteStrategy::Async => self.set_async(ctx, key, value, ttl).await,
        }
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<V> {
        self.inner.get(ctx, key).await
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        self.inner.delete(ctx, key).await
    }
}
