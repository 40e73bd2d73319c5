//! Feed Aggregator Metrics
//!
//! Prometheus metrics for chunked feed aggregation

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};
use std::time::Duration;

static BACKEND_QUERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_backend_queries_total",
        "Chunk range queries issued to the backend (success/error)",
        &["status"]
    )
    .expect("Failed to register feed backend queries metric")
});

static DOC_READS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "feed_doc_reads_total",
        "Documents read while aggregating feeds, query hits plus content reads"
    )
    .expect("Failed to register feed doc reads metric")
});

static PAGE_LOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_page_loads_total",
        "Feed page loads (success/error)",
        &["status"]
    )
    .expect("Failed to register feed page loads metric")
});

static PAGE_LOAD_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "feed_page_load_duration_seconds",
        "Duration of a single feed page load",
        &["status"],
        vec![0.001, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register feed page load duration metric")
});

static FEEDS_COMPLETED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "feed_aggregations_completed_total",
        "Aggregation sessions that reached the end of every chunk"
    )
    .expect("Failed to register feed completion metric")
});

/// Record one chunk query outcome (success/error)
pub fn record_backend_query(status: &str) {
    BACKEND_QUERIES_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_doc_reads(count: u64) {
    DOC_READS_TOTAL.inc_by(count);
}

/// Record a page load outcome and how long it took
pub fn record_page_load(status: &str, duration: Duration) {
    PAGE_LOADS_TOTAL.with_label_values(&[status]).inc();
    PAGE_LOAD_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(duration.as_secs_f64());
}

pub fn record_feed_completed() {
    FEEDS_COMPLETED_TOTAL.inc();
}
