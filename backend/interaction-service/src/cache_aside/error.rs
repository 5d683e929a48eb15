//! Repository error taxonomy
//!
//! Only relational and input errors ever reach a caller. Cache and
//! propagation variants exist so background tasks can log a typed cause.

use collection_cache::CacheError;
use counter_propagation::PropagationError;
use thiserror::Error;

use super::store::StoreError;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Store query failed: {0}")]
    StoreQueryFailed(#[source] StoreError),

    #[error("Store write failed: {0}")]
    StoreWriteFailed(#[source] StoreError),

    #[error("Transaction aborted: {0}")]
    StoreTransactionFailed(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(#[source] CacheError),

    #[error("Counter propagation failed: {0}")]
    PropagationFailed(#[from] PropagationError),

    #[error("Cache payload serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid action type: {0}")]
    InvalidActionType(i32),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl RepositoryError {
    /// Wrap a failed read, promoting aborted transactions.
    pub fn query(err: StoreError) -> Self {
        match err {
            StoreError::Transaction(_) => Self::StoreTransactionFailed(err.to_string()),
            other => Self::StoreQueryFailed(other),
        }
    }

    /// Wrap a failed mutation, promoting aborted transactions.
    pub fn write(err: StoreError) -> Self {
        match err {
            StoreError::Transaction(_) => Self::StoreTransactionFailed(err.to_string()),
            other => Self::StoreWriteFailed(other),
        }
    }

    /// True for errors caused by caller-supplied data.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            RepositoryError::InvalidActionType(_) | RepositoryError::InvalidArgument(_)
        )
    }
}

impl From<CacheError> for RepositoryError {
    fn from(err: CacheError) -> Self {
        if err.is_transaction_abort() {
            RepositoryError::StoreTransactionFailed(err.to_string())
        } else {
            RepositoryError::CacheUnavailable(err)
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aborted_cache_transaction_is_a_transaction_failure() {
        let err = RepositoryError::from(CacheError::Transaction("EXECABORT".into()));
        assert!(matches!(err, RepositoryError::StoreTransactionFailed(_)));

        let err = RepositoryError::from(CacheError::Unavailable("offline".into()));
        assert!(matches!(err, RepositoryError::CacheUnavailable(_)));
    }

    #[test]
    fn test_aborted_store_transaction_is_promoted() {
        let err = RepositoryError::write(StoreError::Transaction(sqlx::Error::PoolTimedOut));
        assert!(matches!(err, RepositoryError::StoreTransactionFailed(_)));

        let err = RepositoryError::query(StoreError::from(sqlx::Error::PoolTimedOut));
        assert!(matches!(err, RepositoryError::StoreQueryFailed(_)));

        let err = RepositoryError::write(StoreError::Unavailable("down".into()));
        assert!(matches!(err, RepositoryError::StoreWriteFailed(_)));
        assert!(!err.is_invalid_input());
    }
}
