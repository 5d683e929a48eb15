/// Error types for interaction-service
use thiserror::Error;

use crate::cache_aside::RepositoryError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Repository error: {0}")]
    Repository(#[source] RepositoryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        if err.is_invalid_input() {
            ServiceError::InvalidInput(err.to_string())
        } else {
            ServiceError::Repository(err)
        }
    }
}

impl ServiceError {
    /// HTTP-style status code for transports built on top of the services.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::InvalidInput(_) => 400,
            ServiceError::PermissionDenied(_) => 403,
            ServiceError::NotFound(_) => 404,
            ServiceError::Repository(_) | ServiceError::Internal(_) => 500,
        }
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
