//! Errors raised while building domain values.

use thiserror::Error;

/// Rejection of a value before it reaches storage.
///
/// Storage and transport failures never show up here; they have their own
/// error types in the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input, such as an unknown order status.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A value would break a rule the model relies on (negative stock).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Identifier that is not a positive integer.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Message without the variant prefix, suitable for a client response.
    pub fn detail(&self) -> &str {
        match self {
            Self::Validation(msg) | Self::InvariantViolation(msg) | Self::InvalidId(msg) => msg,
        }
    }
}
