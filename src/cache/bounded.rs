//! Capacity-Bounded Store Module
//!
//! Wraps a TTL store with a hard limit on live keys.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{Cache, CacheStats, Context, TtlStore};
use crate::config::Config;
use crate::error::{CacheError, Result};

// == Bounded Store ==
/// Admission control in front of a [`TtlStore`].
///
/// New keys are rejected with `OverCapacity` once `max_entries` keys are
/// present; overwrites of existing keys are always admitted. The live-key
/// counter is only touched inside the store's exclusive lock, either by an
/// admitted insert or by the eviction listener this type installs first in
/// the store's listener list. The wrapped store is owned and never handed
/// out, so every write passes admission.
pub struct BoundedStore<V> {
    store: TtlStore<V>,
    max_entries: usize,
    live: Arc<AtomicUsize>,
}

impl<V> BoundedStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Wraps `store`, counting any entries it already holds.
    ///
    /// Fails with `ExceedsCapacity` when `store` already holds more than
    /// `max_entries` keys.
    pub fn new(store: TtlStore<V>, max_entries: usize) -> Result<Self> {
        let present = store.len();
        if present > max_entries {
            return Err(CacheError::ExceedsCapacity {
                present,
                max: max_entries,
            });
        }
        Ok(Self::attach(store, max_entries))
    }

    /// Creates a bounded store over a fresh store built from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::attach(TtlStore::from_config(config), config.max_entries)
    }

    fn attach(store: TtlStore<V>, max_entries: usize) -> Self {
        let live = Arc::new(AtomicUsize::new(0));

        let counter = live.clone();
        store.prepend_eviction_listener(
            Arc::new(move |_: &str, _: &V| {
                let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
            }),
            |present| live.store(present, Ordering::Release),
        );

        Self {
            store,
            max_entries,
            live,
        }
    }

    // == Insert ==
    /// Stores a value unless it would add a key beyond the limit.
    pub fn insert(&self, key: &str, value: V, ttl: Duration) -> Result<()> {
        let max = self.max_entries;
        self.store.insert_guarded(key, value, ttl, |exists| {
            if exists {
                return Ok(());
            }
            if self.live.load(Ordering::Acquire) >= max {
                return Err(CacheError::OverCapacity {
                    key: key.to_string(),
                    max,
                });
            }
            self.live.fetch_add(1, Ordering::AcqRel);
            Ok(())
        })
    }

    // == Store Access ==
    /// Retrieves a live value, evicting it first if it has expired.
    pub fn lookup(&self, key: &str) -> Result<V> {
        self.store.lookup(key)
    }

    /// Removes an entry, releasing its slot. Returns whether one was removed.
    pub fn remove(&self, key: &str) -> bool {
        self.store.remove(key)
    }

    /// Runs one bounded sweep pass now, releasing the slots of expired entries.
    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired()
    }

    /// Appends an eviction listener, run after the slot accounting.
    pub fn add_eviction_listener<F>(&self, listener: F)
    where
        F: Fn(&str, &V) + Send + Sync + 'static,
    {
        self.store.add_eviction_listener(listener);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    /// Remaining TTL of a live entry; `Ok(None)` means it never expires.
    pub fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>> {
        self.store.ttl_remaining(key)
    }

    /// Number of stored entries, including expired ones not yet removed.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Number of keys counted against the limit.
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// The configured limit.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Returns current store statistics.
    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    /// Stops the wrapped store's sweep task. Idempotent.
    pub fn close(&self) -> bool {
        self.store.close()
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }
}

#[async_trait]
impl<V> Cache<V> for BoundedStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn set(&self, ctx: &Context, key: &str, value: V, ttl: Duration) -> Result<()> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        self.insert(key, value, ttl)
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<V> {
        self.store.get(ctx, key).await
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        self.store.delete(ctx, key).await
    }
}
