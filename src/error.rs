use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::storage::StorageError;

/// Errors surfaced by the challenge and session service layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        ServiceError::InvalidInput(errors.to_string())
    }
}
