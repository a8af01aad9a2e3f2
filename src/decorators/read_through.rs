//! Read-Through Decorator
//!
//! Loads missing keys from an external source and refills the wrapped cache.
//! Three refill strategies are offered: inline, detached, and coalesced.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{Cache, Context};
use crate::config::Config;
use crate::decorators::{LogSink, TracingSink};
use crate::error::{CacheError, Result};

// == Loader ==
/// A value produced by a [`Loader`], with an optional TTL override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded<V> {
    pub value: V,
    /// TTL for the refill; the decorator's TTL applies when None
    pub ttl: Option<Duration>,
}

impl<V> Loaded<V> {
    pub fn new(value: V) -> Self {
        Self { value, ttl: None }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Source of values for keys missing from the cache.
#[async_trait]
pub trait Loader<V>: Send + Sync {
    async fn load(&self, ctx: &Context, key: &str) -> Result<Loaded<V>>;
}

/// Adapts an async closure `(Context, String) -> Result<V>` into a [`Loader`].
pub struct FnLoader<F, V> {
    f: F,
    _value: PhantomData<fn() -> V>,
}

/// Wraps `f` as a loader whose values use the decorator's TTL.
pub fn loader_fn<F, Fut, V>(f: F) -> FnLoader<F, V>
where
    F: Fn(Context, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V>> + Send + 'static,
{
    FnLoader {
        f,
        _value: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, V> Loader<V> for FnLoader<F, V>
where
    F: Fn(Context, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V>> + Send + 'static,
    V: Send + 'static,
{
    async fn load(&self, ctx: &Context, key: &str) -> Result<Loaded<V>> {
        (self.f)(ctx.clone(), key.to_string()).await.map(Loaded::new)
    }
}

// == Refill Strategy ==
/// How a miss is refilled when going through [`Cache::get`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefillStrategy {
    /// Load and refill inline before returning
    #[default]
    Sync,
    /// Load inline, refill from a detached task
    Async,
    /// Share one in-flight load among all concurrent callers of a key
    Deduplicated,
}

type SharedLoad<V> = Shared<BoxFuture<'static, Result<V>>>;
type LoadGroups<V> = Arc<Mutex<HashMap<String, SharedLoad<V>>>>;

/// Removes a key's coalescing group when the representative load ends,
/// including by panic.
struct GroupGuard<V> {
    groups: LoadGroups<V>,
    key: String,
}

impl<V> Drop for GroupGuard<V> {
    fn drop(&mut self) {
        self.groups.lock().remove(&self.key);
    }
}

// == Read-Through Cache ==
/// Decorator that loads missing keys and writes them back to the inner cache.
pub struct ReadThroughCache<V> {
    inner: Arc<dyn Cache<V>>,
    loader: Arc<dyn Loader<V>>,
    sink: Arc<dyn LogSink>,
    ttl: Duration,
    strategy: RefillStrategy,
    load_timeout: Option<Duration>,
    groups: LoadGroups<V>,
}

impl<V> ReadThroughCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Wraps `inner`, refilling misses from `loader` with entries living `ttl`.
    pub fn new(inner: Arc<dyn Cache<V>>, loader: Arc<dyn Loader<V>>, ttl: Duration) -> Self {
        Self {
            inner,
            loader,
            sink: Arc::new(TracingSink),
            ttl,
            strategy: RefillStrategy::default(),
            load_timeout: None,
            groups: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Creates a coalescing read-through cache using the configured TTL and load deadline.
    pub fn from_config(inner: Arc<dyn Cache<V>>, loader: Arc<dyn Loader<V>>, config: &Config) -> Self {
        let mut cache = Self::new(inner, loader, config.default_ttl())
            .with_strategy(RefillStrategy::Deduplicated);
        cache.load_timeout = config.load_timeout();
        cache
    }

    /// Replaces the default tracing sink.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Selects the strategy used by [`Cache::get`].
    pub fn with_strategy(mut self, strategy: RefillStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Bounds every coalesced load by `timeout`.
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    pub fn strategy(&self) -> RefillStrategy {
        self.strategy
    }

    /// Number of keys with a coalesced load in flight.
    pub fn in_flight(&self) -> usize {
        self.groups.lock().len()
    }

    /// Returns the cached value, or None when the miss should be loaded.
    async fn cached(&self, ctx: &Context, key: &str) -> Result<Option<V>> {
        match self.inner.get(ctx, key).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => {
                debug!(key = %key, "Read-through miss");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    // == Synchronous Refill ==
    /// Loads a missing key and refills the cache before returning.
    ///
    /// A failed refill is logged; the loaded value is still returned.
    pub async fn get_sync(&self, ctx: &Context, key: &str) -> Result<V> {
        if let Some(value) = self.cached(ctx, key).await? {
            return Ok(value);
        }

        let loaded = ctx.run(self.loader.load(ctx, key)).await?;
        let ttl = loaded.ttl.unwrap_or(self.ttl);
        if let Err(err) = self.inner.set(ctx, key, loaded.value.clone(), ttl).await {
            self.sink.log(key, &err);
        }
        Ok(loaded.value)
    }

    // == Asynchronous Refill ==
    /// Loads a missing key and refills the cache from a detached task.
    ///
    /// Concurrent misses on the same key each call the loader.
    pub async fn get_async(&self, ctx: &Context, key: &str) -> Result<V> {
        if let Some(value) = self.cached(ctx, key).await? {
            return Ok(value);
        }

        let loaded = ctx.run(self.loader.load(ctx, key)).await?;
        let ttl = loaded.ttl.unwrap_or(self.ttl);

        let inner = self.inner.clone();
        let sink = self.sink.clone();
        let owned_key = key.to_string();
        let value = loaded.value.clone();
        tokio::spawn(async move {
            if let Err(err) = inner.set(&Context::background(), &owned_key, value, ttl).await {
                sink.log(&owned_key, &err);
            }
        });

        Ok(loaded.value)
    }

    // == Deduplicated Refill ==
    /// Loads a missing key at most once across concurrent callers.
    ///
    /// The first caller starts the load as its own task; later callers attach
    /// to it. Every caller receives the same value or error. A caller whose
    /// context ends stops waiting without affecting the load or other waiters.
    pub async fn get_deduplicated(&self, ctx: &Context, key: &str) -> Result<V> {
        if let Some(value) = self.cached(ctx, key).await? {
            return Ok(value);
        }

        let load = self.join_or_start(key);
        ctx.run(load).await
    }

    fn join_or_start(&self, key: &str) -> SharedLoad<V> {
        let mut groups = self.groups.lock();
        if let Some(load) = groups.get(key) {
            debug!(key = %key, "Joining in-flight load");
            return load.clone();
        }

        let guard = GroupGuard {
            groups: self.groups.clone(),
            key: key.to_string(),
        };
        let inner = self.inner.clone();
        let loader = self.loader.clone();
        let sink = self.sink.clone();
        let default_ttl = self.ttl;
        let load_ctx = match self.load_timeout {
            Some(timeout) => Context::with_timeout(timeout),
            None => Context::background(),
        };

        // The group is inserted before this lock is released, so the guard's
        // removal always targets this load.
        let task = tokio::spawn(async move {
            let _guard = guard;
            let key = _guard.key.as_str();
            let loaded = load_ctx.run(loader.load(&load_ctx, key)).await?;
            let ttl = loaded.ttl.unwrap_or(default_ttl);
            if let Err(err) = inner.set(&load_ctx, key, loaded.value.clone(), ttl).await {
                sink.log(key, &err);
            }
            Ok::<V, CacheError>(loaded.value)
        });

        let load = task
            .map(|joined| {
                joined.unwrap_or_else(|err| Err(CacheError::backend(format!("load task failed: {}", err))))
            })
            .boxed()
            .shared();
        groups.insert(key.to_string(), load.clone());
        load
    }
}

#[async_trait]
impl<V> Cache<V> for ReadThroughCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn set(&self, ctx: &Context, key: &str, value: V, ttl: Duration) -> Result<()> {
        self.inner.set(ctx, key, value, ttl).await
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<V> {
        match self.strategy {
            RefillStrategy::Sync => self.get_sync(ctx, key).await,
            RefillStrategy::Async => self.get_async(ctx, key).await,
            RefillStrategy::Deduplicated => self.get_deduplicated(ctx, key).await,
        }
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        self.inner.delete(ctx, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{BoundedStore, TtlStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(60);

    struct CountingLoader {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingLoader {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail: false,
            })
        }

        fn failing(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Loader<String> for CountingLoader {
        async fn load(&self, _ctx: &Context, key: &str) -> Result<Loaded<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(CacheError::backend(format!("no row for {}", key)))
            } else {
                Ok(Loaded::new(format!("loaded:{}", key)))
            }
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl Cache<String> for BrokenCache {
        async fn set(&self, _: &Context, _: &str, _: String, _: Duration) -> Result<()> {
            Err(CacheError::backend("connection reset"))
        }

        async fn get(&self, _: &Context, _: &str) -> Result<String> {
            Err(CacheError::backend("connection reset"))
        }

        async fn delete(&self, _: &Context, _: &str) -> Result<()> {
            Err(CacheError::backend("connection reset"))
        }
    }

    fn store() -> Arc<TtlStore<String>> {
        Arc::new(TtlStore::new(Duration::from_secs(3600)))
    }

    fn recording_sink() -> (Arc<dyn LogSink>, Arc<Mutex<Vec<String>>>) {
        let logged = Arc::new(Mutex::new(Vec::new()));
        let target = logged.clone();
        let sink = move |key: &str, _: &CacheError| target.lock().push(key.to_string());
        (Arc::new(sink), logged)
    }

    #[tokio::test]
    async fn test_sync_refills_on_miss() {
        let inner = store();
        let loader = CountingLoader::new(Duration::ZERO);
        let cache = ReadThroughCache::new(inner.clone(), loader.clone(), TTL);
        let ctx = Context::background();

        assert_eq!(cache.get(&ctx, "a").await.unwrap(), "loaded:a");
        assert_eq!(inner.lookup("a").unwrap(), "loaded:a");

        // Second read is served from the cache
        assert_eq!(cache.get(&ctx, "a").await.unwrap(), "loaded:a");
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test]
    async fn test_sync_loader_error_is_returned() {
        let inner = store();
        let cache = ReadThroughCache::new(inner.clone(), CountingLoader::failing(Duration::ZERO), TTL);

        let err = cache.get_sync(&Context::background(), "a").await.unwrap_err();
        assert_eq!(err, CacheError::Backend("no row for a".to_string()));
        assert!(inner.is_empty());
    }

    #[tokio::test]
    async fn test_sync_refill_failure_is_logged() {
        let inner = Arc::new(BoundedStore::new(TtlStore::new(Duration::from_secs(3600)), 0).unwrap());
        let (sink, logged) = recording_sink();
        let cache = ReadThroughCache::new(inner.clone(), CountingLoader::new(Duration::ZERO), TTL)
            .with_sink(sink);

        let value = cache.get_sync(&Context::background(), "a").await.unwrap();
        assert_eq!(value, "loaded:a");
        assert_eq!(*logged.lock(), vec!["a".to_string()]);
        assert_eq!(inner.live_count(), 0);
    }

    #[tokio::test]
    async fn test_backend_error_skips_loader() {
        let loader = CountingLoader::new(Duration::ZERO);
        let ctx = Context::background();

        for strategy in [RefillStrategy::Sync, RefillStrategy::Async, RefillStrategy::Deduplicated] {
            let cache = ReadThroughCache::new(Arc::new(BrokenCache), loader.clone(), TTL)
                .with_strategy(strategy);
            let err = cache.get(&ctx, "a").await.unwrap_err();
            assert_eq!(err, CacheError::Backend("connection reset".to_string()));
        }
        assert_eq!(loader.calls(), 0);
    }

    #[tokio::test]
    async fn test_async_refill_happens_in_background() {
        let inner = store();
        let cache = ReadThroughCache::new(inner.clone(), CountingLoader::new(Duration::ZERO), TTL)
            .with_strategy(RefillStrategy::Async);

        assert_eq!(cache.get(&Context::background(), "a").await.unwrap(), "loaded:a");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(inner.lookup("a").unwrap(), "loaded:a");
    }

    #[tokio::test]
    async fn test_async_refill_failure_is_logged() {
        let (sink, logged) = recording_sink();
        let inner = Arc::new(BoundedStore::new(TtlStore::new(Duration::from_secs(3600)), 0).unwrap());
        let cache = ReadThroughCache::new(inner, CountingLoader::new(Duration::ZERO), TTL)
            .with_sink(sink);

        assert_eq!(cache.get_async(&Context::background(), "a").await.unwrap(), "loaded:a");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*logged.lock(), vec!["a".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_deduplicated_loads_once() {
        let inner = store();
        let loader = CountingLoader::new(Duration::from_millis(100));
        let cache = Arc::new(
            ReadThroughCache::new(inner.clone(), loader.clone(), TTL)
                .with_strategy(RefillStrategy::Deduplicated),
        );

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get(&Context::background(), "hot").await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "loaded:hot");
        }
        assert_eq!(loader.calls(), 1);
        assert_eq!(cache.in_flight(), 0);
        assert_eq!(inner.lookup("hot").unwrap(), "loaded:hot");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_deduplicated_shares_errors() {
        let inner = store();
        let loader = CountingLoader::failing(Duration::from_millis(100));
        let cache = Arc::new(ReadThroughCache::new(inner.clone(), loader.clone(), TTL));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_deduplicated(&Context::background(), "k").await })
            })
            .collect();

        for handle in handles {
            assert_eq!(
                handle.await.unwrap(),
                Err(CacheError::Backend("no row for k".to_string()))
            );
        }
        assert_eq!(loader.calls(), 1);
        assert!(inner.is_empty());
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_cancel_load() {
        let inner = store();
        let loader = CountingLoader::new(Duration::from_millis(100));
        let cache = Arc::new(ReadThroughCache::new(inner.clone(), loader.clone(), TTL));

        let (cancellable, handle) = Context::background().with_cancel();
        let first = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_deduplicated(&cancellable, "k").await })
        };
        let second = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_deduplicated(&Context::background(), "k").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        assert_eq!(first.await.unwrap(), Err(CacheError::Cancelled));
        assert_eq!(second.await.unwrap().unwrap(), "loaded:k");
        assert_eq!(loader.calls(), 1);
        assert_eq!(inner.lookup("k").unwrap(), "loaded:k");
    }

    #[tokio::test]
    async fn test_load_timeout_applies_to_coalesced_load() {
        let inner = store();
        let cache = ReadThroughCache::new(inner.clone(), CountingLoader::new(Duration::from_secs(5)), TTL)
            .with_load_timeout(Duration::from_millis(20));

        let result = cache.get_deduplicated(&Context::background(), "slow").await;
        assert_eq!(result, Err(CacheError::DeadlineExceeded));
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_loader_fn_and_ttl_override() {
        struct ShortLived;

        #[async_trait]
        impl Loader<String> for ShortLived {
            async fn load(&self, _: &Context, key: &str) -> Result<Loaded<String>> {
                Ok(Loaded::new(key.to_uppercase()).with_ttl(Duration::from_millis(20)))
            }
        }

        let inner = store();
        let ctx = Context::background();
        let cache = ReadThroughCache::new(inner.clone(), Arc::new(ShortLived), TTL);
        assert_eq!(cache.get(&ctx, "abc").await.unwrap(), "ABC");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(inner.lookup("abc").is_err());

        let cache = ReadThroughCache::new(
            inner.clone(),
            Arc::new(loader_fn(|_ctx: Context, key: String| async move { Ok(key.len().to_string()) })),
            TTL,
        );
        assert_eq!(cache.get(&ctx, "four").await.unwrap(), "4");
        assert!(inner.ttl_remaining("four").unwrap().unwrap() > Duration::from_secs(50));
    }

    #[tokio::test]
    async fn test_set_and_delete_forward() {
        let inner = store();
        let cache = ReadThroughCache::new(inner.clone(), CountingLoader::new(Duration::ZERO), TTL);
        let ctx = Context::background();

        cache.set(&ctx, "k", "v".to_string(), TTL).await.unwrap();
        assert_eq!(inner.lookup("k").unwrap(), "v");
        cache.delete(&ctx, "k").await.unwrap();
        assert!(inner.is_empty());
    }
}
