//! Self-updating cache-aside layer
//!
//! Serves values that are expensive to compute, keyed by string:
//! - Refreshes through a [`Fetcher`] only when the entry is older than the
//!   caller's max age
//! - Chains overlapping lookups for a key so they share one result
//! - Persists entries through a [`PersistedStore`] so they outlive the process
//! - Drops writes from refreshes that a later `set`/`clear` superseded

mod entry;
mod error;
mod fetcher;
mod keys;
mod metrics;

pub mod store;

pub use entry::{CacheEntry, Clock, ManualClock, SystemClock};
pub use error::{CacheError, CacheResult};
pub use fetcher::{fetcher_fn, Fetcher, FnFetcher};
pub use keys::{CacheKey, CACHE_VERSION};
pub use metrics::CacheMetrics;
pub use store::{MemoryStore, PersistedStore, RedisStore, SharedRedis};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default max ages
pub mod ttl {
    use std::time::Duration;

    pub const USER: Duration = Duration::from_secs(3600); // 1 hour
    pub const POST: Duration = Duration::from_secs(3600); // 1 hour
    /// Always refresh
    pub const FORCE: Duration = Duration::ZERO;
    /// Never refresh once cached
    pub const FOREVER: Duration = Duration::MAX;
}

/// Values the cache can hold
pub trait Cacheable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Cacheable for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

type EntryFuture<T> = Shared<BoxFuture<'static, CacheResult<CacheEntry<T>>>>;

/// Persist bookkeeping. Sequence numbers are handed out at call time; a
/// refresh may only persist if nothing newer has been committed for its key
/// and no clear happened after it started.
#[derive(Default)]
struct WriteLedger {
    committed: HashMap<String, u64>,
    floor: u64,
}

struct Inner<F: Fetcher> {
    name: String,
    store: Arc<dyn PersistedStore>,
    fetcher: F,
    clock: Arc<dyn Clock>,
    metrics: CacheMetrics,
    /// Latest request per key. Never held across an await.
    requests: Mutex<HashMap<String, EntryFuture<F::Output>>>,
    next_seq: AtomicU64,
    ledger: tokio::sync::Mutex<WriteLedger>,
}

/// Cloneable handle to one cache instance
pub struct SelfUpdatingCache<F: Fetcher> {
    inner: Arc<Inner<F>>,
}

impl<F: Fetcher> Clone for SelfUpdatingCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F> SelfUpdatingCache<F>
where
    F: Fetcher,
    F::Output: Cacheable,
{
    pub fn new(store: impl PersistedStore, fetcher: F) -> Self {
        Self::with_clock(store, fetcher, Arc::new(SystemClock))
    }

    pub fn with_clock(store: impl PersistedStore, fetcher: F, clock: Arc<dyn Clock>) -> Self {
        let name = store.name().to_string();
        Self {
            inner: Arc::new(Inner {
                metrics: CacheMetrics::new(name.clone()),
                name,
                store: Arc::new(store),
                fetcher,
                clock,
                requests: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(1),
                ledger: tokio::sync::Mutex::new(WriteLedger::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Look up `key`, refreshing through the fetcher with `args` when there is
    /// no entry or it is at least `max_age` old.
    ///
    /// The request is registered as the key's current one before this returns,
    /// so a later `get` waits for this one and reuses its result if that is
    /// still fresh enough. Nothing runs until the returned future (or a later
    /// request chained on it) is polled.
    pub fn get(
        &self,
        key: &str,
        max_age: Duration,
        args: F::Args,
    ) -> impl Future<Output = CacheResult<CacheEntry<F::Output>>> + Send + 'static {
        let seq = self.inner.next_seq();
        let mut requests = self.inner.requests.lock();
        let previous = requests.get(key).cloned();
        let request = Arc::clone(&self.inner)
            .resolve(key.to_string(), max_age, args, seq, previous)
            .boxed()
            .shared();
        requests.insert(key.to_string(), request.clone());
        request
    }

    /// Store `data` unconditionally, stamped with the current time. Never
    /// calls the fetcher.
    ///
    /// Inside a Tokio runtime the store write starts immediately on its own
    /// task, so it lands even if the returned future is dropped. Awaiting the
    /// future reports the outcome of that write.
    pub fn set(
        &self,
        key: &str,
        data: F::Output,
    ) -> impl Future<Output = CacheResult<CacheEntry<F::Output>>> + Send + 'static {
        let seq = self.inner.next_seq();
        let entry = CacheEntry::new(data, self.inner.clock.now());
        let ready: EntryFuture<F::Output> =
            futures::future::ready(Ok(entry.clone())).boxed().shared();
        self.inner.requests.lock().insert(key.to_string(), ready);

        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        let written = entry.clone();
        let write = async move { inner.persist(&key, &written, seq).await.map(|_| ()) };
        let persisted: BoxFuture<'static, CacheResult<()>> =
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let handle = runtime.spawn(write);
                    async move {
                        match handle.await {
                            Ok(result) => result,
                            Err(e) => Err(CacheError::from(e)),
                        }
                    }
                    .boxed()
                }
                Err(_) => write.boxed(),
            };

        async move {
            persisted.await?;
            Ok(entry)
        }
    }

    /// Every persisted entry. Does not consult in-flight requests.
    pub async fn get_all(&self) -> CacheResult<Vec<CacheEntry<F::Output>>> {
        let raw = self.inner.store.get_all().await?;
        let mut entries = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            match serde_json::from_str::<CacheEntry<F::Output>>(&value) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(cache = %self.inner.name, key = %key, error = %e, "Skipping corrupt entry");
                }
            }
        }
        Ok(entries)
    }

    /// Empty the persisted table and forget every in-memory request.
    /// Refreshes already running when this is called will not persist.
    pub async fn clear(&self) -> CacheResult<()> {
        let seq = self.inner.next_seq();
        self.inner.requests.lock().clear();

        let mut ledger = self.inner.ledger.lock().await;
        ledger.floor = seq;
        ledger.committed.clear();
        self.inner.store.clear().await?;

        self.inner.metrics.record_clear();
        info!(cache = %self.inner.name, "Cache cleared");
        Ok(())
    }
}

impl<F> Inner<F>
where
    F: Fetcher,
    F::Output: Cacheable,
{
    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    async fn resolve(
        self: Arc<Self>,
        key: String,
        max_age: Duration,
        args: F::Args,
        seq: u64,
        previous: Option<EntryFuture<F::Output>>,
    ) -> CacheResult<CacheEntry<F::Output>> {
        let known = match previous {
            Some(previous) => match previous.await {
                Ok(entry) => Some(entry),
                // A failed predecessor leaves nothing in memory
                Err(_) => self.load(&key).await?,
            },
            None => self.load(&key).await?,
        };

        if let Some(entry) = known {
            if !entry.is_stale(max_age, self.clock.now()) {
                debug!(cache = %self.name, key = %key, "Cache hit");
                self.metrics.record_hit();
                return Ok(entry);
            }
        }

        debug!(cache = %self.name, key = %key, "Cache miss, refreshing");
        self.metrics.record_miss();
        let data = self.fetcher.fetch(args).await.map_err(|e| {
            warn!(cache = %self.name, key = %key, error = %e, "Cache updater failed");
            self.metrics.record_updater_error();
            CacheError::fetch(e)
        })?;

        let entry = CacheEntry::new(data, self.clock.now());
        self.persist(&key, &entry, seq).await?;
        Ok(entry)
    }

    async fn load(&self, key: &str) -> CacheResult<Option<CacheEntry<F::Output>>> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(cache = %self.name, key = %key, error = %e, "Cache deserialization failed");
                Ok(None)
            }
        }
    }

    async fn persist(
        &self,
        key: &str,
        entry: &CacheEntry<F::Output>,
        seq: u64,
    ) -> CacheResult<bool> {
        let data = serde_json::to_string(entry)?;

        let mut ledger = self.ledger.lock().await;
        let superseded = seq <= ledger.floor
            || ledger
                .committed
                .get(key)
                .is_some_and(|&committed| committed > seq);
        if superseded {
            debug!(cache = %self.name, key = %key, seq, "Dropping superseded write");
            self.metrics.record_superseded_write();
            return Ok(false);
        }

        self.store.put(key, data).await?;
        ledger.committed.insert(key.to_string(), seq);
        self.metrics.record_write();
        Ok(true)
    }
}
