//! Error types for flag management and storage.

use thiserror::Error;

/// Result type for flag operations.
pub type FlagResult<T> = Result<T, FlagError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by [`FlagManager`](crate::FlagManager) CRUD operations.
///
/// Evaluation never returns these: a missing or disabled flag is reported
/// through [`EvaluationReason`](crate::EvaluationReason) instead.
#[derive(Debug, Error)]
pub enum FlagError {
    /// Flag identifier is absent
    #[error("Flag not found: {0}")]
    NotFound(String),

    /// Malformed flag, rule or rollout configuration
    #[error("Validation error: {0}")]
    Validation(String),

    /// Underlying persistence failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors reported by a [`FlagStorage`](crate::FlagStorage) engine.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Record does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// (name, environment, tenant) is already taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage call exceeded its deadline
    #[error("Storage operation timed out")]
    Timeout,

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl FlagError {
    /// Whether this error means the flag does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FlagError::NotFound(_) | FlagError::Storage(StorageError::NotFound(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_converts() {
        let err: FlagError = StorageError::Backend("disk full".to_string()).into();
        assert!(matches!(err, FlagError::Storage(StorageError::Backend(_))));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(FlagError::NotFound("x".to_string()).is_not_found());
        assert!(FlagError::Storage(StorageError::NotFound("x".to_string())).is_not_found());
        assert!(!FlagError::Validation("bad".to_string()).is_not_found());
    }
}
