//! Cache Store Module
//!
//! Concurrent TTL store: HashMap storage behind a reader-writer lock, lazy
//! double-checked expiration on read, and a background sweep task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::cache::stats::StatsCounters;
use crate::cache::{Cache, CacheEntry, CacheStats, Context, DEFAULT_SWEEP_BATCH};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_sweep_task, Sweep, SweepTask};

/// Observer notified once per removal, inside the removal's critical section.
///
/// Listeners must not call back into the store that notifies them.
pub type EvictionListener<V> = Arc<dyn Fn(&str, &V) + Send + Sync>;

// == Store Internals ==
struct StoreInner<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// Ordered eviction observers
    listeners: Vec<EvictionListener<V>>,
}

impl<V> StoreInner<V> {
    fn notify(&self, key: &str, value: &V) {
        for listener in &self.listeners {
            listener(key, value);
        }
    }
}

pub(crate) struct StoreShared<V> {
    inner: RwLock<StoreInner<V>>,
    stats: StatsCounters,
}

impl<V> StoreShared<V> {
    /// Removes up to `max` expired entries under one exclusive lock.
    fn purge_expired(&self, max: usize) -> usize {
        let mut guard = self.inner.write();
        let StoreInner { entries, listeners } = &mut *guard;
        let now = Instant::now();
        let mut removed = 0;

        entries.retain(|key, entry| {
            if removed < max && entry.is_expired_at(now) {
                for listener in listeners.iter() {
                    listener(key, &entry.value);
                }
                removed += 1;
                false
            } else {
                true
            }
        });

        self.stats.record_swept(removed as u64);
        removed
    }
}

impl<V: Send + Sync + 'static> Sweep for StoreShared<V> {
    fn sweep(&self, max: usize) -> usize {
        self.purge_expired(max)
    }
}

// == TTL Store ==
/// Concurrency-safe key/value store with per-entry TTL.
///
/// Expired entries are never returned. They are removed either lazily by the
/// read that discovers them or by the background sweep, and every removal
/// notifies the eviction listeners exactly once.
pub struct TtlStore<V> {
    shared: Arc<StoreShared<V>>,
    sweeper: Option<SweepTask>,
    sweep_batch: usize,
}

/// Builder for [`TtlStore`].
pub struct TtlStoreBuilder<V> {
    sweep_interval: Duration,
    sweep_batch: usize,
    listeners: Vec<EvictionListener<V>>,
}

impl<V> TtlStoreBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Interval between background sweeps, at least one millisecond.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Maximum expired entries removed per sweep.
    pub fn sweep_batch(mut self, batch: usize) -> Self {
        self.sweep_batch = batch.max(1);
        self
    }

    /// Appends an eviction listener.
    pub fn on_evict<F>(mut self, listener: F) -> Self
    where
        F: Fn(&str, &V) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Creates the store and starts its sweep task.
    ///
    /// Outside a tokio runtime no sweep task is started; expired entries are
    /// then removed lazily or through [`TtlStore::purge_expired`].
    pub fn build(self) -> TtlStore<V> {
        let shared = Arc::new(StoreShared {
            inner: RwLock::new(StoreInner {
                entries: HashMap::new(),
                listeners: self.listeners,
            }),
            stats: StatsCounters::default(),
        });

        let target = Arc::downgrade(&shared);
        let sweeper = spawn_sweep_task(target, self.sweep_interval, self.sweep_batch);
        debug!(
            "TTL store created: sweep_interval={:?}, sweep_batch={}, sweeping={}",
            self.sweep_interval,
            self.sweep_batch,
            sweeper.is_some()
        );

        TtlStore {
            shared,
            sweeper,
            sweep_batch: self.sweep_batch,
        }
    }
}

impl<V> TtlStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructors ==
    /// Returns a builder with a one second sweep interval and default batch size.
    pub fn builder() -> TtlStoreBuilder<V> {
        TtlStoreBuilder {
            sweep_interval: Duration::from_secs(1),
            sweep_batch: DEFAULT_SWEEP_BATCH,
            listeners: Vec::new(),
        }
    }

    /// Creates a store sweeping every `sweep_interval`.
    pub fn new(sweep_interval: Duration) -> Self {
        Self::builder().sweep_interval(sweep_interval).build()
    }

    /// Creates a store from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::builder()
            .sweep_interval(config.sweep_interval())
            .sweep_batch(config.sweep_batch)
            .build()
    }

    // == Insert ==
    /// Stores a value expiring `ttl` from now, overwriting any prior entry.
    ///
    /// Overwrites never notify eviction listeners.
    pub fn insert(&self, key: &str, value: V, ttl: Duration) {
        let entry = CacheEntry::new(value, ttl);
        self.shared.inner.write().entries.insert(key.to_string(), entry);
    }

    /// Stores a value after `admit` approves it, inside the same exclusive lock.
    ///
    /// `admit` receives whether the key is already present. An error from it
    /// leaves the store untouched.
    pub(crate) fn insert_guarded<F>(&self, key: &str, value: V, ttl: Duration, admit: F) -> Result<()>
    where
        F: FnOnce(bool) -> Result<()>,
    {
        let mut guard = self.shared.inner.write();
        admit(guard.entries.contains_key(key))?;
        guard
            .entries
            .insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    // == Lookup ==
    /// Retrieves a live value by key.
    ///
    /// The fast path holds only the shared lock. An expired entry escalates to
    /// the exclusive lock and is re-checked there, so a concurrent refresh wins
    /// and a concurrent removal is never notified twice.
    pub fn lookup(&self, key: &str) -> Result<V> {
        {
            let guard = self.shared.inner.read();
            match guard.entries.get(key) {
                Some(entry) if !entry.is_expired() => {
                    self.shared.stats.record_hit();
                    return Ok(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.shared.stats.record_miss();
                    return Err(CacheError::KeyNotFound(key.to_string()));
                }
            }
        }

        let mut guard = self.shared.inner.write();
        let now = Instant::now();
        let still_expired = match guard.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                // Refreshed between the two lock acquisitions
                self.shared.stats.record_hit();
                return Ok(entry.value.clone());
            }
            Some(_) => true,
            // Removed between the two lock acquisitions
            None => false,
        };

        if still_expired {
            if let Some(entry) = guard.entries.remove(key) {
                guard.notify(key, &entry.value);
                self.shared.stats.record_expiration();
                self.shared.stats.record_eviction();
            }
        }
        self.shared.stats.record_miss();
        Err(CacheError::KeyNotFound(key.to_string()))
    }

    // == Remove ==
    /// Removes an entry by key, notifying listeners if it was present.
    ///
    /// Returns whether an entry was removed.
    pub fn remove(&self, key: &str) -> bool {
        let mut guard = self.shared.inner.write();
        match guard.entries.remove(key) {
            Some(entry) => {
                guard.notify(key, &entry.value);
                self.shared.stats.record_eviction();
                true
            }
            None => false,
        }
    }

    // == Purge Expired ==
    /// Runs one bounded sweep pass now.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        self.shared.purge_expired(self.sweep_batch)
    }

    // == Listeners ==
    /// Appends an eviction listener.
    pub fn add_eviction_listener<F>(&self, listener: F)
    where
        F: Fn(&str, &V) + Send + Sync + 'static,
    {
        self.shared.inner.write().listeners.push(Arc::new(listener));
    }

    /// Installs `listener` ahead of all others.
    ///
    /// `on_installed` runs inside the same critical section with the current
    /// entry count, so the caller can seed state the listener maintains.
    pub(crate) fn prepend_eviction_listener<F>(&self, listener: EvictionListener<V>, on_installed: F)
    where
        F: FnOnce(usize),
    {
        let mut guard = self.shared.inner.write();
        guard.listeners.insert(0, listener);
        on_installed(guard.entries.len());
    }

    // == Introspection ==
    /// Returns true if `key` holds an unexpired entry.
    pub fn contains_key(&self, key: &str) -> bool {
        self.shared
            .inner
            .read()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Remaining TTL of a live entry; `Ok(None)` means it never expires.
    pub fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>> {
        let guard = self.shared.inner.read();
        match guard.entries.get(key) {
            Some(entry) if !entry.is_expired() => Ok(entry.ttl_remaining()),
            _ => Err(CacheError::KeyNotFound(key.to_string())),
        }
    }

    /// Number of stored entries, including expired ones not yet removed.
    pub fn len(&self) -> usize {
        self.shared.inner.read().entries.len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.shared.inner.read().entries.is_empty()
    }

    /// Returns current store statistics.
    pub fn stats(&self) -> CacheStats {
        let total_entries = self.len();
        self.shared.stats.snapshot(total_entries)
    }

    // == Close ==
    /// Stops the background sweep task.
    ///
    /// Safe to call any number of times; only the first call signals the task.
    /// Returns whether this call performed the stop.
    pub fn close(&self) -> bool {
        self.sweeper.as_ref().is_some_and(SweepTask::stop)
    }

    /// Returns true once the sweep task has been told to stop, or never ran.
    pub fn is_closed(&self) -> bool {
        self.sweeper.as_ref().map_or(true, SweepTask::is_stopped)
    }
}

#[async_trait]
impl<V> Cache<V> for TtlStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn set(&self, ctx: &Context, key: &str, value: V, ttl: Duration) -> Result<()> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        self.insert(key, value, ttl);
        Ok(())
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<V> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        self.lookup(key)
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        self.remove(key);
        Ok(())
    }
}
