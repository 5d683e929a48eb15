//! Counter aggregator consumer
//!
//! Consumes delta messages sequentially, applies each to the counter store and
//! commits the offset only after the apply succeeded. A crash between apply
//! and commit redelivers the message; sinks use `delta_id` to skip it.

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::{
    CounterTopics, DeltaEvent, PropagationConfig, PropagationError, PropagationMetrics,
    PropagationResult, DELTA_ID_HEADER,
};

/// Result of applying one delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Counter changed
    Applied,
    /// `delta_id` seen before; counter untouched
    Duplicate,
}

/// Persisted counters owned by the aggregating service.
#[async_trait::async_trait]
pub trait CounterSink: Send + Sync {
    /// Add `event.delta` to the counter of `event.entity_id`.
    async fn apply_delta(&self, event: &DeltaEvent) -> PropagationResult<ApplyOutcome>;
}

/// What happened to one consumed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Applied,
    Duplicate,
    /// Undecodable; logged and skipped
    Skipped,
}

/// Retry policy for transient apply failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Exponential backoff: base * 2^attempt, capped at max_delay
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Decodes messages and drives a [`CounterSink`], independent of the Kafka client.
pub struct DeltaApplier<S: CounterSink> {
    sink: Arc<S>,
    topics: CounterTopics,
    retry: RetryPolicy,
    metrics: Option<PropagationMetrics>,
}

impl<S: CounterSink> DeltaApplier<S> {
    pub fn new(sink: Arc<S>, topics: CounterTopics, retry: RetryPolicy) -> Self {
        Self {
            sink,
            topics,
            retry,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PropagationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Handle one raw message.
    ///
    /// Returns `Err` only when the sink kept failing after every retry; the
    /// caller must then stop without committing so the message is redelivered.
    pub async fn handle(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: Option<&[u8]>,
        delta_id: Option<&[u8]>,
    ) -> PropagationResult<MessageOutcome> {
        let event = match self
            .topics
            .counter_for(topic)
            .and_then(|counter| DeltaEvent::decode(counter, key, payload, delta_id))
        {
            Ok(event) => event,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Skipping malformed counter delta");
                if let Some(metrics) = &self.metrics {
                    metrics.malformed.with_label_values(&[topic]).inc();
                }
                return Ok(MessageOutcome::Skipped);
            }
        };

        let mut attempt = 0;
        loop {
            match self.sink.apply_delta(&event).await {
                Ok(ApplyOutcome::Applied) => {
                    debug!(
                        counter = %event.counter,
                        entity_id = event.entity_id,
                        delta = event.delta,
                        "Counter delta applied"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics
                            .applied
                            .with_label_values(&[event.counter.as_str()])
                            .inc();
                    }
                    return Ok(MessageOutcome::Applied);
                }
                Ok(ApplyOutcome::Duplicate) => {
                    info!(
                        counter = %event.counter,
                        entity_id = event.entity_id,
                        delta_id = ?event.delta_id,
                        "Duplicate counter delta skipped"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics
                            .duplicates
                            .with_label_values(&[event.counter.as_str()])
                            .inc();
                    }
                    return Ok(MessageOutcome::Duplicate);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        error!(
                            counter = %event.counter,
                            entity_id = event.entity_id,
                            attempts = attempt,
                            error = %e,
                            "Counter delta apply failed, giving up"
                        );
                        return Err(e);
                    }

                    let delay = self.retry.backoff(attempt - 1);
                    warn!(
                        counter = %event.counter,
                        entity_id = event.entity_id,
                        attempt = attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %e,
                        "Counter delta apply failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Kafka consumer loop feeding a [`DeltaApplier`]
pub struct DeltaConsumer<S: CounterSink> {
    config: PropagationConfig,
    applier: DeltaApplier<S>,
}

impl<S: CounterSink> DeltaConsumer<S> {
    pub fn new(config: PropagationConfig, applier: DeltaApplier<S>) -> Self {
        Self { config, applier }
    }

    /// Run until the sink keeps failing or the client errors fatally.
    pub async fn run(self) -> anyhow::Result<()> {
        let result = self.run_inner().await;
        if let Err(err) = &result {
            error!("Counter delta consumer terminated with error: {err}");
        }
        result.map_err(anyhow::Error::from)
    }

    async fn run_inner(self) -> PropagationResult<()> {
        let topics = self.applier.topics.all();
        info!(
            topics = ?topics,
            group = %self.config.group_id,
            "Starting counter delta consumer"
        );

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", &self.config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", "300000")
            .create()?;

        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topic_refs)?;

        loop {
            match consumer.recv().await {
                Ok(record) => {
                    let outcome = self
                        .applier
                        .handle(
                            record.topic(),
                            record.key(),
                            record.payload(),
                            header_value(&record, DELTA_ID_HEADER),
                        )
                        .await?;

                    debug!(
                        topic = record.topic(),
                        partition = record.partition(),
                        offset = record.offset(),
                        outcome = ?outcome,
                        "Counter delta consumed"
                    );

                    if let Err(commit_err) = consumer.commit_message(&record, CommitMode::Sync) {
                        warn!("Failed to commit Kafka offset: {}", commit_err);
                    }
                }
                Err(err) => {
                    error!("Kafka error: {}", err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

fn header_value<'a>(message: &'a BorrowedMessage<'a>, key: &str) -> Option<&'a [u8]> {
    message.headers().and_then(|headers| {
        headers
            .iter()
            .find(|header| header.key == key)
            .and_then(|header| header.value)
    })
}
