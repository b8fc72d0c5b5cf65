//! Builder API for assembling a cache from its collaborators.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;

use crate::backend::{MemoryBackend, StorageBackend};
use crate::cache::engine::{Callback, Inner};
use crate::cache::{Cache, CacheStats, Entry};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::normalize::{JsonKeyNormalizer, KeyNormalizer};

/// Builder for [`Cache`].
///
/// Everything is optional: the defaults are [`Config::default`], a fresh
/// [`MemoryBackend`], [`JsonKeyNormalizer`] and [`SystemClock`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tag_cache::{Cache, Config};
///
/// let cache: Cache<String, u32> = Cache::builder()
///     .config(Config::default().with_clear_interval(Duration::ZERO))
///     .on_remove(|entry| println!("evicted {}", entry.key))
///     .build();
/// ```
pub struct CacheBuilder<K, V> {
    config: Config,
    backend: Option<Arc<dyn StorageBackend<K, V>>>,
    normalizer: Option<Arc<dyn KeyNormalizer<K>>>,
    clock: Option<Arc<dyn Clock>>,
    on_set: Option<Callback<K, V>>,
    on_remove: Option<Callback<K, V>>,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a new CacheBuilder with all defaults.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            backend: None,
            normalizer: None,
            clock: None,
            on_set: None,
            on_remove: None,
        }
    }

    /// Sets the default TTL, sweep interval and `get_or_set` mode.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Uses `backend` for storage. A backend may be shared between caches
    /// with identical key and value types, though entries then mix.
    pub fn backend<B>(mut self, backend: Arc<B>) -> Self
    where
        B: StorageBackend<K, V> + 'static,
    {
        self.backend = Some(backend);
        self
    }

    /// Replaces the canonical JSON key normalizer.
    pub fn normalizer<N>(mut self, normalizer: N) -> Self
    where
        N: KeyNormalizer<K> + 'static,
    {
        self.normalizer = Some(Arc::new(normalizer));
        self
    }

    /// Replaces the wall clock, mostly for tests.
    pub fn clock<C>(mut self, clock: Arc<C>) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Some(clock);
        self
    }

    /// Called with each new entry right before it is stored.
    pub fn on_set<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Entry<K, V>) + Send + Sync + 'static,
    {
        self.on_set = Some(Arc::new(callback));
        self
    }

    /// Called with each entry right before it is removed by `remove`,
    /// `remove_by_finder` or expiration. Not called by `clear`.
    ///
    /// Runs while the engine holds its write lock. The lock is reentrant, so
    /// the callback may use the same cache from its own thread, but it must
    /// not block on another thread that writes to the cache.
    pub fn on_remove<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Entry<K, V>) + Send + Sync + 'static,
    {
        self.on_remove = Some(Arc::new(callback));
        self
    }

    /// Builds the cache and starts its background sweep.
    ///
    /// The sweep needs a tokio runtime; without one the cache relies on
    /// lazy expiration alone.
    pub fn build(self) -> Cache<K, V>
    where
        K: Serialize,
    {
        let backend: Arc<dyn StorageBackend<K, V>> = match self.backend {
            Some(backend) => backend,
            None => Arc::new(MemoryBackend::new()),
        };
        let normalizer: Arc<dyn KeyNormalizer<K>> = match self.normalizer {
            Some(normalizer) => normalizer,
            None => Arc::new(JsonKeyNormalizer),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        Cache::start(Inner {
            backend,
            normalizer,
            clock,
            config: self.config,
            on_set: self.on_set,
            on_remove: self.on_remove,
            stats: Mutex::new(CacheStats::new()),
            in_flight: Mutex::new(HashMap::new()),
            mutation: ReentrantMutex::new(()),
        })
    }
}

impl<K, V> Default for CacheBuilder<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Cache<K, V>
where
    K: Serialize + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Returns a builder for a customized cache.
    pub fn builder() -> CacheBuilder<K, V> {
        CacheBuilder::new()
    }

    /// Creates a cache with default configuration.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a cache with `config` and default collaborators.
    pub fn with_config(config: Config) -> Self {
        Self::builder().config(config).build()
    }
}

impl<K, V> Default for Cache<K, V>
where
    K: Serialize + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
