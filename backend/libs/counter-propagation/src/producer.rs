//! Delta producer
//!
//! Appends one message per delta, keyed by entity id so every delta of an
//! entity lands on the same partition.

use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    CounterTopics, DeltaEvent, PropagationConfig, PropagationError, PropagationMetrics,
    PropagationResult, DELTA_ID_HEADER,
};

/// Sends counter deltas to the downstream aggregator.
///
/// Callers treat failures as non-fatal; nothing here retries beyond what the
/// broker client does internally.
#[async_trait::async_trait]
pub trait DeltaPublisher: Send + Sync {
    /// Append one delta to its counter topic.
    async fn emit(&self, event: &DeltaEvent) -> PropagationResult<()>;
}

/// Kafka-backed delta publisher
#[derive(Clone)]
pub struct KafkaDeltaPublisher {
    producer: FutureProducer,
    topics: CounterTopics,
    delivery_timeout: Duration,
    metrics: Option<PropagationMetrics>,
}

impl KafkaDeltaPublisher {
    /// Create a new Kafka delta publisher
    pub fn new(config: &PropagationConfig) -> PropagationResult<Self> {
        let producer = rdkafka::config::ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", "interaction-service")
            // Idempotency and reliability settings
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "5")
            .set("retries", "3")
            .set("linger.ms", "5")
            .create::<FutureProducer>()?;

        info!(
            brokers = %config.brokers,
            topic_prefix = %config.topic_prefix,
            "Counter delta producer initialized"
        );

        Ok(Self {
            producer,
            topics: CounterTopics::new(config.topic_prefix.clone()),
            delivery_timeout: config.delivery_timeout,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: PropagationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait::async_trait]
impl DeltaPublisher for KafkaDeltaPublisher {
    async fn emit(&self, event: &DeltaEvent) -> PropagationResult<()> {
        let topic = self.topics.topic(event.counter);
        let key = event.key();
        let payload = event.payload();
        let delta_id = event.delta_id.unwrap_or_else(Uuid::new_v4).to_string();

        let headers = OwnedHeaders::new().insert(Header {
            key: DELTA_ID_HEADER,
            value: Some(delta_id.as_bytes()),
        });

        let record = FutureRecord::to(&topic)
            .key(&key)
            .payload(&payload)
            .headers(headers);

        match self.producer.send(record, self.delivery_timeout).await {
            Ok((partition, offset)) => {
                debug!(
                    topic = %topic,
                    entity_id = event.entity_id,
                    delta = event.delta,
                    partition = partition,
                    offset = offset,
                    "Counter delta published"
                );
                if let Some(metrics) = &self.metrics {
                    metrics
                        .published
                        .with_label_values(&[event.counter.as_str()])
                        .inc();
                }
                Ok(())
            }
            Err((err, _)) => {
                warn!(
                    error = ?err,
                    topic = %topic,
                    entity_id = event.entity_id,
                    delta = event.delta,
                    "Failed to publish counter delta"
                );
                if let Some(metrics) = &self.metrics {
                    metrics
                        .publish_failures
                        .with_label_values(&[event.counter.as_str()])
                        .inc();
                }
                Err(PropagationError::PublishFailed(err.to_string()))
            }
        }
    }
}

/// Publisher used when no broker is configured; deltas are logged and dropped.
#[derive(Clone, Default)]
pub struct NoopDeltaPublisher;

#[async_trait::async_trait]
impl DeltaPublisher for NoopDeltaPublisher {
    async fn emit(&self, event: &DeltaEvent) -> PropagationResult<()> {
        debug!(
            counter = %event.counter,
            entity_id = event.entity_id,
            delta = event.delta,
            "No broker configured, dropping counter delta"
        );
        Ok(())
    }
}
