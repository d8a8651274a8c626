//! Error types for the storage layer.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value failed to map back to a domain type.
    #[error("Type error: {0}")]
    Types(#[from] tollgate_types::TypesError),

    /// Visitor not found.
    #[error("Visitor not found: {0}")]
    VisitorNotFound(i64),

    /// Payment not found.
    #[error("Payment not found: {0}")]
    PaymentNotFound(i64),

    /// An entity was written without being persisted first.
    #[error("Entity has no row id: {0}")]
    Unsaved(&'static str),

    /// Address derivation failed inside a storage transaction.
    #[error("Derivation error: {0}")]
    Derivation(String),

    /// Every attempted deposit address was already taken.
    #[error("address collision persisted after {attempts} attempts")]
    AddressCollision { attempts: u32 },

    /// Schema initialization error.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Invalid data format.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Lock poisoning error.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    /// Create a derivation error.
    pub fn derivation(msg: impl Into<String>) -> Self {
        StoreError::Derivation(msg.into())
    }

    /// Create a schema error.
    pub fn schema(msg: impl Into<String>) -> Self {
        StoreError::Schema(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        StoreError::InvalidData(msg.into())
    }

    /// Create a lock poisoned error.
    pub fn lock_poisoned(msg: impl Into<String>) -> Self {
        StoreError::LockPoisoned(msg.into())
    }

    /// Whether this error is a SQLite uniqueness violation.
    ///
    /// Callers race on the `visitor.ip` and `payment.address` unique
    /// indexes and recover by re-reading or re-deriving, so this class
    /// of failure must stay distinguishable.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Database(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}
