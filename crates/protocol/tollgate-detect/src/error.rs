//! Error types for the detection layer.

use thiserror::Error;

/// Result type alias for detection operations.
pub type Result<T> = std::result::Result<T, DetectError>;

/// Errors that can occur while running a detector.
///
/// The pipeline never propagates these; a failing detector is logged
/// and scored as an inconclusive verdict.
#[derive(Debug, Error)]
pub enum DetectError {
    /// DNS resolution failed in a way that is not a plain "no data".
    #[error("DNS error: {0}")]
    Dns(String),

    /// A detector rule was malformed.
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// A version range expression failed to parse.
    #[error("invalid version expression {expr:?}: {reason}")]
    InvalidVersionExpr { expr: String, reason: String },
}

impl DetectError {
    /// Create a DNS error.
    pub fn dns(msg: impl Into<String>) -> Self {
        DetectError::Dns(msg.into())
    }

    /// Create an invalid-rule error.
    pub fn invalid_rule(msg: impl Into<String>) -> Self {
        DetectError::InvalidRule(msg.into())
    }

    /// Create an invalid version expression error.
    pub fn invalid_version_expr(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        DetectError::InvalidVersionExpr {
            expr: expr.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DetectError::invalid_version_expr("<=x", "bad version");
        assert!(err.to_string().contains("<=x"));
    }
}
