//! Error types for the payment layer.

use thiserror::Error;

/// Result type alias for payment operations.
pub type Result<T> = std::result::Result<T, PayError>;

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PayError {
    /// Storage failure.
    #[error("Store error: {0}")]
    Store(#[from] tollgate_store::StoreError),

    /// Domain type failure (amount parsing, enum codes).
    #[error("Type error: {0}")]
    Types(#[from] tollgate_types::TypesError),

    /// The configured extended public key is unusable.
    #[error("invalid extended public key: {0}")]
    Xpub(String),

    /// Child key or address derivation failed.
    #[error("derivation failed: {0}")]
    Derivation(String),

    /// No unused deposit address could be allocated.
    #[error("address allocation failed after {attempts} attempts")]
    AddressAllocation { attempts: u32 },

    /// The balance source returned an unusable response.
    #[error("balance source error: {0}")]
    Balance(String),

    /// HTTP transport failure talking to the balance source.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PayError {
    /// Create an xpub error.
    pub fn xpub(msg: impl Into<String>) -> Self {
        PayError::Xpub(msg.into())
    }

    /// Create a derivation error.
    pub fn derivation(msg: impl Into<String>) -> Self {
        PayError::Derivation(msg.into())
    }

    /// Create a balance source error.
    pub fn balance(msg: impl Into<String>) -> Self {
        PayError::Balance(msg.into())
    }
}
