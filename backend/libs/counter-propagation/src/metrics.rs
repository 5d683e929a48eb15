use prometheus::{IntCounterVec, Opts};
use tracing::warn;

#[derive(Clone)]
pub struct PropagationMetrics {
    pub published: IntCounterVec,
    pub publish_failures: IntCounterVec,
    pub applied: IntCounterVec,
    pub duplicates: IntCounterVec,
    pub malformed: IntCounterVec,
}

impl PropagationMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let counter = |name: &str, help: &str, labels: &[&str]| {
            IntCounterVec::new(
                Opts::new(name, help).const_label("service", service.to_string()),
                labels,
            )
            .expect("valid metric opts for counter propagation")
        };

        let published = counter(
            "counter_deltas_published_total",
            "Counter deltas handed to the broker",
            &["counter"],
        );
        let publish_failures = counter(
            "counter_deltas_publish_failures_total",
            "Counter deltas the broker did not accept",
            &["counter"],
        );
        let applied = counter(
            "counter_deltas_applied_total",
            "Counter deltas applied by the aggregator",
            &["counter"],
        );
        let duplicates = counter(
            "counter_deltas_duplicate_total",
            "Redelivered counter deltas skipped by the aggregator",
            &["counter"],
        );
        let malformed = counter(
            "counter_deltas_malformed_total",
            "Undecodable counter delta messages skipped",
            &["topic"],
        );

        for metric in [
            Box::new(published.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(publish_failures.clone()),
            Box::new(applied.clone()),
            Box::new(duplicates.clone()),
            Box::new(malformed.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register counter propagation metric: {}", e);
            }
        }

        Self {
            published,
            publish_failures,
            applied,
            duplicates,
            malformed,
        }
    }
}
