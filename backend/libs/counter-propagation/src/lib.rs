//! # Counter Propagation
//!
//! Carries `(entity_id, signed_delta)` pairs from the services that own
//! interaction records (comments, favorites, follows) to the service that owns
//! the aggregate counters.
//!
//! ```text
//! Repository write ──► DeltaPublisher::emit ──► Kafka topic per counter
//!                                                   │ key = entity id
//!                                                   ▼
//!                           DeltaConsumer ──► DeltaApplier ──► CounterSink::apply_delta
//!                                                   │
//!                                     commit offset after apply
//! ```
//!
//! ## Delivery
//!
//! - Producers are fire-and-forget from the request's point of view.
//! - Consumers process at-least-once. Each delta carries a `delta_id` header
//!   so a sink can skip redeliveries instead of drifting.

mod config;
mod error;
mod event;

pub mod consumer;
pub mod metrics;
pub mod producer;

pub use config::PropagationConfig;
pub use consumer::{
    ApplyOutcome, CounterSink, DeltaApplier, DeltaConsumer, MessageOutcome, RetryPolicy,
};
pub use error::{PropagationError, PropagationResult};
pub use event::{CounterKind, CounterTopics, DeltaEvent, DELTA_ID_HEADER};
pub use metrics::PropagationMetrics;
pub use producer::{DeltaPublisher, KafkaDeltaPublisher, NoopDeltaPublisher};
