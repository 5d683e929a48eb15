//! Error types for counter propagation.

use thiserror::Error;

/// Result type alias for propagation operations.
pub type PropagationResult<T> = Result<T, PropagationError>;

/// Errors that can occur while emitting or applying counter deltas.
#[derive(Error, Debug)]
pub enum PropagationError {
    /// Failed to hand a delta to the message broker
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Message could not be decoded into a delta (never retried)
    #[error("Malformed delta message: {0}")]
    Malformed(String),

    /// Topic does not belong to any known counter
    #[error("Unknown counter topic: {0}")]
    UnknownTopic(String),

    /// Downstream counter store rejected the delta
    #[error("Apply failed: {0}")]
    ApplyFailed(String),

    /// Kafka client error
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Generic error with context
    #[error("Propagation error: {0}")]
    Other(#[from] anyhow::Error),
}

impl PropagationError {
    /// Poison messages are skipped instead of retried.
    pub fn is_poison(&self) -> bool {
        matches!(
            self,
            PropagationError::Malformed(_) | PropagationError::UnknownTopic(_)
        )
    }
}
