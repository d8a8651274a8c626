//! Error types for the engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, OpsError>;

/// Errors that can occur in the engine.
#[derive(Debug, Error)]
pub enum OpsError {
    /// Storage failure.
    #[error("Store error: {0}")]
    Store(#[from] tollgate_store::StoreError),

    /// Detection failure.
    #[error("Detect error: {0}")]
    Detect(#[from] tollgate_detect::DetectError),

    /// Payment layer failure.
    #[error("Payment error: {0}")]
    Pay(#[from] tollgate_pay::PayError),

    /// Domain type failure.
    #[error("Type error: {0}")]
    Types(#[from] tollgate_types::TypesError),

    /// The configuration does not describe a runnable gate.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl OpsError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        OpsError::Config(msg.into())
    }
}
