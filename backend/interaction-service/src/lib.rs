//! Interaction service
//!
//! Comments, favorites and follows stored in PostgreSQL, read through a
//! per-parent collection cache in Redis, with aggregate counters kept
//! eventually consistent through Kafka delta topics.

pub mod cache_aside;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod repository;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{ServiceError, ServiceResult};
pub use state::AppState;
