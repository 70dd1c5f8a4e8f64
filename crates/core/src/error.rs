//! Domain error model.

use thiserror::Error;

/// Result alias for domain-level operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic domain failure.
///
/// Infrastructure failures (cache, queue, storage) have their own error types
/// in the crates that own those concerns.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Input failed a domain validation rule.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced entity does not exist.
    #[error("entity not found")]
    NotFound,
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
