//! Persisted key-value storage behind a cache
//!
//! Each cache instance owns one named table. Values are JSON documents.

use crate::{CacheKey, CacheResult};
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Shared Redis connection manager
pub type SharedRedis = Arc<tokio::sync::Mutex<ConnectionManager>>;

/// Durable per-key storage used by the cache
#[async_trait::async_trait]
pub trait PersistedStore: Send + Sync + 'static {
    /// Table name this handle was opened with
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn put(&self, key: &str, value: String) -> CacheResult<()>;

    async fn get_all(&self) -> CacheResult<Vec<(String, String)>>;

    async fn clear(&self) -> CacheResult<()>;
}

#[async_trait::async_trait]
impl<S: PersistedStore + ?Sized> PersistedStore for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: String) -> CacheResult<()> {
        (**self).put(key, value).await
    }

    async fn get_all(&self) -> CacheResult<Vec<(String, String)>> {
        (**self).get_all().await
    }

    async fn clear(&self) -> CacheResult<()> {
        (**self).clear().await
    }
}

/// Redis-backed store: one hash per cache name
#[derive(Clone)]
pub struct RedisStore {
    redis: SharedRedis,
    name: String,
    table: String,
}

impl RedisStore {
    pub fn open(redis: SharedRedis, name: &str) -> Self {
        Self {
            redis,
            name: name.to_string(),
            table: CacheKey::store(name),
        }
    }

    /// Connect to `redis_url` and open the table for `name`
    pub async fn connect(redis_url: &str, name: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::open(
            Arc::new(tokio::sync::Mutex::new(manager)),
            name,
        ))
    }
}

#[async_trait::async_trait]
impl PersistedStore for RedisStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.redis.lock().await;
        let value: Option<String> = conn.hget(&self.table, key).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: String) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        conn.hset::<_, _, _, ()>(&self.table, key, value).await?;
        debug!(table = %self.table, key = %key, "Store put");
        Ok(())
    }

    async fn get_all(&self) -> CacheResult<Vec<(String, String)>> {
        let mut conn = self.redis.lock().await;
        let entries: HashMap<String, String> = conn.hgetall(&self.table).await?;
        Ok(entries.into_iter().collect())
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        conn.del::<_, ()>(&self.table).await?;
        debug!(table = %self.table, "Store cleared");
        Ok(())
    }
}

/// Process-local store. Clones share the same table, so a second cache built
/// on a clone sees everything the first one persisted.
#[derive(Clone, Default)]
pub struct MemoryStore {
    name: String,
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn open(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Arc::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Overwrite a raw value, bypassing the cache
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
    }
}

#[async_trait::async_trait]
impl PersistedStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> CacheResult<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn get_all(&self) -> CacheResult<Vec<(String, String)>> {
        Ok(self
            .entries
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn clear(&self) -> CacheResult<()> {
        self.entries.lock().clear();
        Ok(())
    }
}
