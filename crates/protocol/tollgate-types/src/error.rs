//! Error type for the types crate.

use thiserror::Error;

/// Result type alias for type-level operations.
pub type Result<T> = std::result::Result<T, TypesError>;

/// Errors that can occur while constructing or converting domain types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// A database code did not map to a known enum variant.
    #[error("unknown {entity} code: {code}")]
    UnknownCode { entity: &'static str, code: i64 },

    /// A monetary amount string could not be parsed at the method's scale.
    #[error("invalid amount {value:?}: {reason}")]
    InvalidAmount { value: String, reason: String },

    /// A field failed validation.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl TypesError {
    /// Create an unknown-code error.
    pub fn unknown_code(entity: &'static str, code: i64) -> Self {
        TypesError::UnknownCode { entity, code }
    }

    /// Create an invalid-amount error.
    pub fn invalid_amount(value: impl Into<String>, reason: impl Into<String>) -> Self {
        TypesError::InvalidAmount {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        TypesError::Validation(msg.into())
    }
}
