//! TTL/LRU cache
//!
//! Memoizes values under string keys with bounded memory (LRU eviction at
//! capacity) and bounded staleness (per-entry TTL). Expired entries are
//! treated as absent on read and removed by a background sweep.
//!
//! All state lives behind one `RwLock`. Reads share it; the last-access
//! mark of an entry is an atomic so a read can touch it without taking the
//! lock exclusively. Writes and sweeps are exclusive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument, Span};

use config_rs::ConfigError;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Cache configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Lifetime of an entry after its last `set`
    pub ttl: Duration,

    /// Maximum number of entries held at once
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_size: 1000,
        }
    }
}

impl CacheConfig {
    /// Load `<PREFIX>_CACHE_TTL` and `<PREFIX>_CACHE_MAX_SIZE`
    pub fn from_env(prefix: &str) -> Self {
        let defaults = Self::default();
        let prefix = prefix.to_uppercase();
        Self {
            ttl: config_rs::get_env_duration(&format!("{}_CACHE_TTL", prefix), defaults.ttl),
            max_size: config_rs::get_env_u64(
                &format!("{}_CACHE_MAX_SIZE", prefix),
                defaults.max_size as u64,
            ) as usize,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl.is_zero() {
            return Err(ConfigError::Validation("cache ttl must be greater than zero".into()));
        }
        if self.max_size == 0 {
            return Err(ConfigError::Validation("cache max_size must be greater than zero".into()));
        }
        Ok(())
    }

    /// Sweep interval, proportional to the TTL
    fn sweep_interval(&self) -> Duration {
        (self.ttl / 2).max(MIN_SWEEP_INTERVAL)
    }
}

struct CacheItem<V> {
    value: V,
    expires_at: Instant,
    // Logical access clock; strictly increasing across the cache so LRU order
    // is total even when the wall clock does not move between accesses.
    last_accessed: AtomicU64,
}

struct CacheInner<V> {
    items: RwLock<HashMap<String, CacheItem<V>>>,
    access_clock: AtomicU64,
    config: CacheConfig,
}

impl<V> CacheInner<V> {
    fn tick(&self) -> u64 {
        self.access_clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|_, item| item.expires_at > now);
        before - items.len()
    }
}

/// Thread-safe TTL/LRU cache
pub struct Cache<V> {
    inner: Arc<CacheInner<V>>,
    sweeper: CancellationToken,
    span: Span,
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache and start its expiry sweep on the current runtime.
    ///
    /// Fails when `config` does not pass [`CacheConfig::validate`].
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        Self::with_span(config, tracing::debug_span!("cache"))
    }

    /// Create a cache that logs inside `span`
    pub fn with_span(config: CacheConfig, span: Span) -> Result<Self, ConfigError> {
        config.validate()?;

        let interval = config.sweep_interval();
        let inner = Arc::new(CacheInner {
            items: RwLock::new(HashMap::new()),
            access_clock: AtomicU64::new(0),
            config,
        });

        let sweeper = CancellationToken::new();
        spawn_sweeper(Arc::downgrade(&inner), sweeper.clone(), interval, span.clone());

        Ok(Self { inner, sweeper, span })
    }

    /// Look up a live entry, marking it as recently used
    pub fn get(&self, key: &str) -> Option<V> {
        let items = self.inner.items.read();
        let item = items.get(key)?;

        // Lazy expiry: the sweep removes it later
        if item.expires_at <= Instant::now() {
            return None;
        }

        item.last_accessed.store(self.inner.tick(), Ordering::Relaxed);
        Some(item.value.clone())
    }

    /// Insert or overwrite an entry with a fresh expiry.
    ///
    /// Inserting a new key into a full cache first evicts exactly one entry:
    /// the least recently accessed one.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let item = self.new_item(value);

        let mut items = self.inner.items.write();
        if !items.contains_key(&key) {
            self.make_room(&mut items);
        }
        items.insert(key, item);
    }

    /// Insert an entry only when no live entry exists for `key`; returns
    /// whether the value was stored.
    ///
    /// An expired entry counts as absent and is replaced.
    pub fn insert_if_absent(&self, key: impl Into<String>, value: V) -> bool {
        let key = key.into();
        let now = Instant::now();

        let mut items = self.inner.items.write();
        match items.get(&key) {
            Some(existing) if existing.expires_at > now => return false,
            Some(_) => {}
            None => self.make_room(&mut items),
        }
        items.insert(key, self.new_item(value));
        true
    }

    fn new_item(&self, value: V) -> CacheItem<V> {
        CacheItem {
            value,
            expires_at: Instant::now() + self.inner.config.ttl,
            last_accessed: AtomicU64::new(self.inner.tick()),
        }
    }

    // Evicts the least recently accessed entry when the cache is full
    fn make_room(&self, items: &mut HashMap<String, CacheItem<V>>) {
        if items.len() < self.inner.config.max_size {
            return;
        }

        let oldest = items
            .iter()
            .min_by_key(|(_, item)| item.last_accessed.load(Ordering::Relaxed))
            .map(|(k, _)| k.clone());

        if let Some(oldest) = oldest {
            items.remove(&oldest);
            self.span.in_scope(|| debug!(key = %oldest, "Evicted least recently used entry"));
        }
    }

    /// Remove an entry; returns whether it was present
    pub fn delete(&self, key: &str) -> bool {
        self.inner.items.write().remove(key).is_some()
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.inner.items.write().clear();
    }

    /// Number of entries held, including expired entries not yet swept
    pub fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove expired entries now; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Stop the background sweep. Reads and writes keep working with lazy
    /// expiry only.
    pub fn shutdown(&self) {
        self.sweeper.cancel();
    }
}

impl<V> Drop for Cache<V> {
    fn drop(&mut self) {
        self.sweeper.cancel();
    }
}

fn spawn_sweeper<V>(inner: Weak<CacheInner<V>>, stop: CancellationToken, every: Duration, span: Span)
where
    V: Send + Sync + 'static,
{
    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            span.in_scope(|| warn!("No tokio runtime available, cache expiry sweep disabled"));
            return;
        }
    };

    handle.spawn(
        async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = inner.upgrade() else { break };
                        let removed = inner.purge_expired();
                        if removed > 0 {
                            debug!(removed, "Swept expired cache entries");
                        }
                    }
                }
            }

            debug!("Cache sweeper stopped");
        }
        .instrument(span),
    );
}
