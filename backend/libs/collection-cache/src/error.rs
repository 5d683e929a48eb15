//! Cache error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache transaction aborted: {0}")]
    Transaction(String),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("Invalid TTL window: {0}")]
    InvalidTtlWindow(String),
}

impl CacheError {
    /// True when an atomic multi-field write did not commit.
    pub fn is_transaction_abort(&self) -> bool {
        matches!(self, CacheError::Transaction(_))
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
