//! Cache metrics for observability

use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    updater_errors: CounterVec,
    writes: CounterVec,
    superseded_writes: CounterVec,
    clears: CounterVec,
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: CounterVec::new(
                Opts::new(
                    "self_updating_cache_hits_total",
                    "Lookups served from a fresh entry",
                ),
                &["cache"],
            )
            .expect("valid metric definition"),
            misses: CounterVec::new(
                Opts::new(
                    "self_updating_cache_misses_total",
                    "Lookups that invoked the updater",
                ),
                &["cache"],
            )
            .expect("valid metric definition"),
            updater_errors: CounterVec::new(
                Opts::new(
                    "self_updating_cache_updater_errors_total",
                    "Updater invocations that failed",
                ),
                &["cache"],
            )
            .expect("valid metric definition"),
            writes: CounterVec::new(
                Opts::new(
                    "self_updating_cache_writes_total",
                    "Entries written to the persisted store",
                ),
                &["cache"],
            )
            .expect("valid metric definition"),
            superseded_writes: CounterVec::new(
                Opts::new(
                    "self_updating_cache_superseded_writes_total",
                    "Refresh results not persisted because a newer write won",
                ),
                &["cache"],
            )
            .expect("valid metric definition"),
            clears: CounterVec::new(
                Opts::new("self_updating_cache_clears_total", "Total cache clears"),
                &["cache"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.updater_errors.clone()))?;
        registry.register(Box::new(self.writes.clone()))?;
        registry.register(Box::new(self.superseded_writes.clone()))?;
        registry.register(Box::new(self.clears.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Per-cache metrics handle, labeled with the cache name
#[derive(Clone, Debug)]
pub struct CacheMetrics {
    cache: String,
}

impl CacheMetrics {
    pub fn new(cache: impl Into<String>) -> Self {
        Self {
            cache: cache.into(),
        }
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self) {
        get_metrics().hits.with_label_values(&[self.cache.as_str()]).inc();
    }

    pub fn record_miss(&self) {
        get_metrics().misses.with_label_values(&[self.cache.as_str()]).inc();
    }

    pub fn record_updater_error(&self) {
        get_metrics()
            .updater_errors
            .with_label_values(&[self.cache.as_str()])
            .inc();
    }

    pub fn record_write(&self) {
        get_metrics().writes.with_label_values(&[self.cache.as_str()]).inc();
    }

    pub fn record_superseded_write(&self) {
        get_metrics()
            .superseded_writes
            .with_label_values(&[self.cache.as_str()])
            .inc();
    }

    pub fn record_clear(&self) {
        get_metrics().clears.with_label_values(&[self.cache.as_str()]).inc();
    }

    #[cfg(test)]
    pub(crate) fn hits(&self) -> f64 {
        get_metrics().hits.with_label_values(&[self.cache.as_str()]).get()
    }

    #[cfg(test)]
    pub(crate) fn misses(&self) -> f64 {
        get_metrics().misses.with_label_values(&[self.cache.as_str()]).get()
    }
}
