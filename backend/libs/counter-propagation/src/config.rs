/// Kafka settings for counter propagation
///
/// Loads configuration from environment variables.
use std::time::Duration;

/// Configuration shared by the delta producer and the aggregator consumer
#[derive(Debug, Clone)]
pub struct PropagationConfig {
    pub brokers: String,
    /// Topic prefix, e.g. "nova" -> "nova.counter.user_follow_count"
    pub topic_prefix: String,
    /// Consumer group of the counter aggregator
    pub group_id: String,
    /// Broker acknowledgement timeout for a single delta
    pub delivery_timeout: Duration,
}

impl PropagationConfig {
    /// Load configuration from environment variables.
    /// Returns `None` when `KAFKA_BROKERS` is unset or empty.
    pub fn from_env() -> Option<Self> {
        let brokers = std::env::var("KAFKA_BROKERS").ok()?;

        if brokers.trim().is_empty() {
            return None;
        }

        Some(Self {
            brokers,
            topic_prefix: std::env::var("KAFKA_TOPIC_PREFIX")
                .unwrap_or_else(|_| "nova".to_string()),
            group_id: std::env::var("COUNTER_CONSUMER_GROUP_ID")
                .unwrap_or_else(|_| "nova-counter-aggregator".to_string()),
            delivery_timeout: Duration::from_secs(
                std::env::var("KAFKA_DELIVERY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        })
    }
}
