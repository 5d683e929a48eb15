//! Cache metrics for observability

use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    materializations: CounterVec,
    child_writes: CounterVec,
    child_evictions: CounterVec,
    errors: CounterVec,
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: CounterVec::new(
                Opts::new(
                    "collection_cache_hits_total",
                    "Existence checks that found a materialized collection",
                ),
                &["domain"],
            )
            .expect("valid metric definition"),
            misses: CounterVec::new(
                Opts::new(
                    "collection_cache_misses_total",
                    "Existence checks that found no materialized collection",
                ),
                &["domain"],
            )
            .expect("valid metric definition"),
            materializations: CounterVec::new(
                Opts::new(
                    "collection_cache_materializations_total",
                    "Collections written with sentinel and TTL",
                ),
                &["domain"],
            )
            .expect("valid metric definition"),
            child_writes: CounterVec::new(
                Opts::new(
                    "collection_cache_child_writes_total",
                    "Single-child upserts applied to materialized collections",
                ),
                &["domain"],
            )
            .expect("valid metric definition"),
            child_evictions: CounterVec::new(
                Opts::new(
                    "collection_cache_child_evictions_total",
                    "Single-child removals",
                ),
                &["domain"],
            )
            .expect("valid metric definition"),
            errors: CounterVec::new(
                Opts::new("collection_cache_errors_total", "Total cache errors"),
                &["domain", "operation"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.materializations.clone()))?;
        registry.register(Box::new(self.child_writes.clone()))?;
        registry.register(Box::new(self.child_evictions.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Cache metrics wrapper, labelled with the key space domain
#[derive(Clone)]
pub struct CacheMetrics {
    domain: String,
}

impl CacheMetrics {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_lookup(&self, materialized: bool) {
        let counter = if materialized {
            &get_metrics().hits
        } else {
            &get_metrics().misses
        };
        counter.with_label_values(&[&self.domain]).inc();
    }

    pub fn record_materialization(&self) {
        get_metrics()
            .materializations
            .with_label_values(&[&self.domain])
            .inc();
    }

    pub fn record_child_write(&self) {
        get_metrics()
            .child_writes
            .with_label_values(&[&self.domain])
            .inc();
    }

    pub fn record_child_eviction(&self) {
        get_metrics()
            .child_evictions
            .with_label_values(&[&self.domain])
            .inc();
    }

    pub fn record_error(&self, operation: &str) {
        get_metrics()
            .errors
            .with_label_values(&[&self.domain, operation])
            .inc();
    }
}
