//! Cache Engine Module
//!
//! Entry lifecycle, dual expiration (background sweep plus lazy checks on
//! read), key/tag queries and lifecycle callbacks on top of a pluggable
//! storage backend.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::StorageBackend;
use crate::cache::{CacheStats, Entry, Finder, GetOptions, SetOptions};
use crate::clock::Clock;
use crate::config::{Config, GetOrSetMode};
use crate::error::{CacheError, Result};
use crate::normalize::KeyNormalizer;
use crate::tasks::{spawn_sweep_task, Sweep};

/// Lifecycle callback receiving the affected entry.
pub type Callback<K, V> = Arc<dyn Fn(&Entry<K, V>) + Send + Sync>;

// == Engine Internals ==
/// State shared between the cache handle and its sweep task.
pub(crate) struct Inner<K, V> {
    pub(crate) backend: Arc<dyn StorageBackend<K, V>>,
    pub(crate) normalizer: Arc<dyn KeyNormalizer<K>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: Config,
    pub(crate) on_set: Option<Callback<K, V>>,
    pub(crate) on_remove: Option<Callback<K, V>>,
    pub(crate) stats: Mutex<CacheStats>,
    /// Per-identifier gates for single-flight `get_or_set`
    pub(crate) in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Serializes backend writes so an eviction never deletes a newer entry
    pub(crate) mutation: ReentrantMutex<()>,
}

impl<K, V> Inner<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn id_for(&self, key: &K) -> Result<String> {
        self.normalizer.normalize(key)
    }

    fn set(&self, key: K, value: V, options: SetOptions) -> Result<()> {
        let id = self.id_for(&key)?;
        let ttl = options.cache_time.or(self.config.cache_time);
        let entry = Entry::new(
            key,
            value,
            options.tags,
            ttl,
            options.refresh,
            self.clock.now_ms(),
        );

        if let Some(on_set) = &self.on_set {
            notify("on_set", on_set, &entry);
        }

        debug!(id = %id, expires_at = ?entry.expires_at, "set entry");
        {
            let _lock = self.mutation.lock();
            self.backend.set_value(&id, entry);
        }
        self.stats.lock().record_set();
        Ok(())
    }

    fn get_entry(&self, key: &K, options: GetOptions) -> Result<Option<Entry<K, V>>> {
        let id = self.id_for(key)?;
        let now = self.clock.now_ms();
        let Some(mut entry) = self.load_live(&id, now) else {
            self.stats.lock().record_miss();
            return Ok(None);
        };

        if options.refresh.unwrap_or(entry.refresh) && !entry.is_infinite() {
            let _lock = self.mutation.lock();
            // Re-read so the write-back cannot undo a concurrent set or remove.
            let Some(current) = self.load_live(&id, now) else {
                self.stats.lock().record_miss();
                return Ok(None);
            };
            entry = current;
            if options.refresh.unwrap_or(entry.refresh) && entry.touch(now) {
                debug!(id = %id, expires_at = ?entry.expires_at, "refreshed entry");
                self.backend.set_value(&id, entry.clone());
            }
        }

        self.stats.lock().record_hit();
        Ok(Some(entry))
    }

    fn get_or_set<F, E>(&self, key: K, producer: F, options: SetOptions) -> std::result::Result<V, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
        E: From<CacheError>,
    {
        if let Some(entry) = self.get_entry(&key, GetOptions::default())? {
            return Ok(entry.value);
        }

        let value = producer()?;
        self.set(key, value.clone(), options)?;
        Ok(value)
    }

    fn has(&self, key: &K) -> Result<bool> {
        let id = self.id_for(key)?;
        Ok(self.load_live(&id, self.clock.now_ms()).is_some())
    }

    /// Returns the live entry under `id`, evicting it first if it has expired.
    fn load_live(&self, id: &str, now: i64) -> Option<Entry<K, V>> {
        let entry = self.backend.get_value(id)?;
        if !entry.is_expired(now) {
            return Some(entry);
        }
        if self.evict_expired(id, now) {
            return None;
        }
        // Replaced by a newer entry since the first read.
        self.backend.get_value(id).filter(|entry| !entry.is_expired(now))
    }

    /// Evicts the entry under `id` through the remove path if, at the time of
    /// the locked re-read, it has expired at `now`.
    fn evict_expired(&self, id: &str, now: i64) -> bool {
        let _lock = self.mutation.lock();
        let Some(entry) = self.backend.get_value(id) else {
            return false;
        };
        if !entry.is_expired(now) {
            return false;
        }
        debug!(id = %id, expires_at = ?entry.expires_at, "evicting expired entry");
        self.delete(id, &entry);
        self.stats.lock().record_expiration();
        true
    }

    /// Fires `on_remove` for the current entry, then deletes it.
    fn remove_id(&self, id: &str) -> bool {
        let _lock = self.mutation.lock();
        let Some(entry) = self.backend.get_value(id) else {
            return false;
        };
        self.delete(id, &entry);
        true
    }

    /// Caller holds the mutation lock.
    fn delete(&self, id: &str, entry: &Entry<K, V>) {
        if let Some(on_remove) = &self.on_remove {
            notify("on_remove", on_remove, entry);
        }
        self.backend.remove(id);
        self.stats.lock().record_removal();
    }

    /// Live entries paired with their identifiers; expired ones are evicted.
    fn live_entries(&self) -> Vec<(String, Entry<K, V>)> {
        let now = self.clock.now_ms();
        self.backend
            .all_keys()
            .into_iter()
            .filter_map(|id| {
                let entry = self.load_live(&id, now)?;
                Some((id, entry))
            })
            .collect()
    }

    fn find(&self, finder: &Finder<K, V>) -> Result<Vec<(String, Entry<K, V>)>> {
        match finder {
            Finder::Predicate(predicate) => Ok(self
                .live_entries()
                .into_iter()
                .filter(|(_, entry)| predicate(entry))
                .collect()),
            Finder::Filter(filter) => {
                if filter.is_empty() {
                    return Ok(Vec::new());
                }
                let ids = match &filter.keys {
                    Some(keys) => Some(
                        keys.iter()
                            .map(|k| self.id_for(k))
                            .collect::<Result<HashSet<String>>>()?,
                    ),
                    None => None,
                };
                Ok(self
                    .live_entries()
                    .into_iter()
                    .filter(|(id, entry)| {
                        ids.as_ref().map_or(true, |ids| ids.contains(id))
                            && filter.matches_tags(entry)
                    })
                    .collect())
            }
        }
    }

    fn clear(&self) {
        let _lock = self.mutation.lock();
        let ids = self.backend.all_keys();
        for id in &ids {
            self.backend.remove(id);
        }
        debug!(backend = self.backend.name(), count = ids.len(), "cleared cache");
    }

    /// Returns the gate serializing single-flight callers on `id`.
    fn gate(&self, id: &str) -> Arc<Mutex<()>> {
        self.in_flight
            .lock()
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl<K, V> Sweep for Inner<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut removed = 0;
        for id in self.backend.all_keys() {
            // Another path may have removed it since the listing.
            let Some(entry) = self.backend.get_value(&id) else {
                continue;
            };
            if entry.is_expired(now) && self.evict_expired(&id, now) {
                removed += 1;
            }
        }
        removed
    }
}

/// Drops the single-flight gate for an identifier once nobody else holds it.
struct FlightGate<'a, K, V> {
    inner: &'a Inner<K, V>,
    id: String,
    gate: Arc<Mutex<()>>,
}

impl<K, V> Drop for FlightGate<'_, K, V> {
    fn drop(&mut self) {
        let mut in_flight = self.inner.in_flight.lock();
        // One reference lives in the map, one here.
        if Arc::strong_count(&self.gate) == 2 {
            in_flight.remove(&self.id);
        }
    }
}

/// Runs a lifecycle callback; a panicking callback is logged, not propagated.
fn notify<K, V>(name: &str, callback: &Callback<K, V>, entry: &Entry<K, V>) {
    if catch_unwind(AssertUnwindSafe(|| callback(entry))).is_err() {
        warn!(callback = name, "cache callback panicked; ignoring");
    }
}

// == Cache ==
/// A key/value cache with TTL expiration, sliding refresh and tag queries.
///
/// Keys are turned into identifiers by a [`KeyNormalizer`], so structurally
/// equal keys share an entry. Expired entries are removed both by a periodic
/// background sweep and lazily whenever a read touches them; callers never
/// observe an expired entry.
///
/// Share a cache between threads by wrapping it in an `Arc`. Dropping the
/// cache stops its sweep task.
pub struct Cache<K, V> {
    pub(crate) inner: Arc<Inner<K, V>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<K, V> Cache<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Wraps assembled internals and starts the sweep if one is configured.
    pub(crate) fn start(inner: Inner<K, V>) -> Self {
        let inner = Arc::new(inner);
        let sweeper = inner.config.sweep_interval().and_then(|interval| {
            match Handle::try_current() {
                Ok(runtime) => Some(spawn_sweep_task(Arc::downgrade(&inner), interval, &runtime)),
                Err(_) => {
                    warn!("No tokio runtime available; expired entries are only evicted on access");
                    None
                }
            }
        });

        Self {
            inner,
            sweeper: Mutex::new(sweeper),
        }
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any previous entry outright.
    ///
    /// The TTL is `options.cache_time` if given (zero = never expire), else
    /// the configured default, else infinite. `on_set` fires before the
    /// entry is written.
    pub fn set(&self, key: K, value: V, options: SetOptions) -> Result<()> {
        self.inner.set(key, value, options)
    }

    // == Get ==
    /// Returns the live value for `key`.
    pub fn get(&self, key: &K, options: GetOptions) -> Result<Option<V>> {
        Ok(self.get_entry(key, options)?.map(|entry| entry.value))
    }

    /// Returns the live entry for `key`.
    ///
    /// An expired entry is evicted and reported as `None`. If the read
    /// refreshes (the `options.refresh` override, else the entry's own flag),
    /// a finite-lived entry's expiry is moved to now plus its TTL.
    pub fn get_entry(&self, key: &K, options: GetOptions) -> Result<Option<Entry<K, V>>> {
        self.inner.get_entry(key, options)
    }

    // == Get Or Set ==
    /// Returns the live value for `key`, or computes, stores and returns one.
    ///
    /// `producer` runs at most once and only when no live entry exists. If it
    /// fails the error is returned unchanged and nothing is stored. Under
    /// [`GetOrSetMode::Lax`] racing callers may each run their producer;
    /// under [`GetOrSetMode::SingleFlight`] only the first does.
    ///
    /// In single-flight mode the producer must not call `get_or_set` for the
    /// same key on the same cache: it would wait on its own gate forever.
    /// Other keys are fine.
    pub fn get_or_set<F, E>(&self, key: K, producer: F, options: SetOptions) -> std::result::Result<V, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
        E: From<CacheError>,
    {
        match self.inner.config.get_or_set_mode {
            GetOrSetMode::Lax => self.inner.get_or_set(key, producer, options),
            GetOrSetMode::SingleFlight => {
                let id = self.inner.id_for(&key)?;
                let flight = FlightGate {
                    inner: &self.inner,
                    gate: self.inner.gate(&id),
                    id,
                };
                let _guard = flight.gate.lock();
                self.inner.get_or_set(key, producer, options)
            }
        }
    }

    /// [`Cache::get_or_set`] for producers that cannot fail.
    pub fn get_or_insert_with<F>(&self, key: K, producer: F, options: SetOptions) -> Result<V>
    where
        F: FnOnce() -> V,
    {
        self.get_or_set(key, || Ok::<V, CacheError>(producer()), options)
    }

    // == Has ==
    /// Reports whether a live entry exists for `key`.
    ///
    /// Applies the same lazy expiration as `get`, so `has` and `get` always
    /// agree. Never refreshes the entry.
    pub fn has(&self, key: &K) -> Result<bool> {
        self.inner.has(key)
    }

    // == All ==
    /// Returns every live entry, in backend order. Expired entries found
    /// along the way are evicted.
    pub fn all(&self) -> Vec<Entry<K, V>> {
        self.inner
            .live_entries()
            .into_iter()
            .map(|(_, entry)| entry)
            .collect()
    }

    // == Remove ==
    /// Removes the entry for `key`, firing `on_remove` first.
    ///
    /// Returns whether an entry was removed; a missing key is not an error.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let id = self.inner.id_for(key)?;
        Ok(self.inner.remove_id(&id))
    }

    // == Clear ==
    /// Removes every entry.
    ///
    /// Unlike `remove`, this does not fire `on_remove`.
    pub fn clear(&self) {
        self.inner.clear();
    }

    // == Find ==
    /// Returns the live entries selected by `finder`.
    ///
    /// An [`EntryFilter`](crate::EntryFilter) without criteria selects
    /// nothing.
    pub fn find(&self, finder: &Finder<K, V>) -> Result<Vec<Entry<K, V>>> {
        Ok(self
            .inner
            .find(finder)?
            .into_iter()
            .map(|(_, entry)| entry)
            .collect())
    }

    /// Removes every entry selected by `finder`, firing `on_remove` for each.
    ///
    /// Returns the number of entries removed.
    pub fn remove_by_finder(&self, finder: &Finder<K, V>) -> Result<usize> {
        let mut removed = 0;
        for (id, _) in self.inner.find(finder)? {
            if self.inner.remove_id(&id) {
                removed += 1;
            }
        }
        debug!(count = removed, "removed entries by finder");
        Ok(removed)
    }

    // == Purge Expired ==
    /// Evicts every expired entry now, returning how many were evicted.
    ///
    /// This is the pass the background sweep runs on each tick.
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    // == Deactivate ==
    /// Stops the background sweep. Idempotent.
    ///
    /// The cache stays usable; expired entries are then only evicted when
    /// touched by a read.
    pub fn deactivate(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
            info!("Expiration sweep stopped");
        }
    }

    /// Returns true while a background sweep task is attached.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    // == Length ==
    /// Returns the number of entries held by the backend, including expired
    /// entries not yet evicted.
    pub fn len(&self) -> usize {
        self.inner.backend.all_keys().len()
    }

    /// Returns true if the backend holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.inner.stats.lock().clone();
        stats.total_entries = self.len();
        stats
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

impl<K, V> Drop for Cache<K, V> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}
