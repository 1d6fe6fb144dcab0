//! Durable storage collaborator
//!
//! The tracker only needs `get` and `set` on opaque byte values. An absent
//! key is `Ok(None)`, never an error.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use config_rs::ConfigError;
use resource_lifecycle::{Cache, CacheConfig};

/// Failure reported by a store
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Minimal key/value store used for the cost ledger
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `Ok(None)` when the key does not exist
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        (**self).set(key, value).await
    }
}

/// In-memory store for development and tests
#[derive(Default)]
pub struct InMemoryStore {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Keys starting with `prefix`, sorted
    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let data = self.data.read().await;
        let mut keys: Vec<String> = data.keys().filter(|k| k.starts_with(prefix)).cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.data.write().await.insert(key.to_string(), value);
        debug!(key, "Stored value");
        Ok(())
    }
}

/// Read-through, write-through memoization in front of another store.
///
/// Only values that exist are cached. A write evicts the key before it
/// reaches the backing store and caches the new value once the store accepts
/// it, so a failed or abandoned write leaves the next read to the backing
/// store.
///
/// A read-through fill never replaces a value written while the read was in
/// flight: every write bumps a generation counter before and after it
/// reaches the backing store, and a fill is dropped when the generation
/// moved since its read started.
pub struct CachedStore<S> {
    inner: S,
    cache: Cache<Vec<u8>>,
    generation: Mutex<u64>,
}

impl<S: KeyValueStore> CachedStore<S> {
    /// Must be called inside a tokio runtime: the cache starts its sweeper
    pub fn new(inner: S, config: CacheConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            inner,
            cache: Cache::with_span(config, tracing::debug_span!("cached_store"))?,
            generation: Mutex::new(0),
        })
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl<S: KeyValueStore> KeyValueStore for CachedStore<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(value) = self.cache.get(key) {
            return Ok(Some(value));
        }

        let started = *self.generation.lock();
        let value = self.inner.get(key).await?;
        if let Some(value) = &value {
            let generation = self.generation.lock();
            if *generation == started {
                self.cache.insert_if_absent(key, value.clone());
            } else {
                debug!(key, "Skipped cache fill, store was written during the read");
            }
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        {
            let mut generation = self.generation.lock();
            self.cache.delete(key);
            *generation += 1;
        }
        let result = self.inner.set(key, value.clone()).await;

        let mut generation = self.generation.lock();
        match &result {
            Ok(()) => self.cache.set(key, value),
            Err(_) => {
                self.cache.delete(key);
            }
        }
        *generation += 1;
        result
    }
}
