//! Version range expressions.
//!
//! Supported forms: `7.0.0` (exact), `>7`, `>=7.1`, `<8`, `<=7.0.0`,
//! `~1.2.3` (at least 1.2.3, below 1.3.0), and `1.0.0 - 2.0.0`
//! (inclusive range).

use crate::error::{DetectError, Result};
use crate::ua::Version;

/// A parsed version range expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionReq {
    Exact(Version),
    Gt(Version),
    Gte(Version),
    Lt(Version),
    Lte(Version),
    Tilde(Version),
    Range(Version, Version),
}

impl VersionReq {
    /// Parse an expression.
    pub fn parse(expr: &str) -> Result<Self> {
        let s = expr.trim();
        if s.is_empty() {
            return Err(DetectError::invalid_version_expr(expr, "empty expression"));
        }

        let version = |v: &str| {
            Version::parse(v.trim())
                .ok_or_else(|| DetectError::invalid_version_expr(expr, "bad version"))
        };

        if let Some((lo, hi)) = s.split_once(" - ") {
            return Ok(VersionReq::Range(version(lo)?, version(hi)?));
        }
        if let Some(rest) = s.strip_prefix(">=") {
            return Ok(VersionReq::Gte(version(rest)?));
        }
        if let Some(rest) = s.strip_prefix("<=") {
            return Ok(VersionReq::Lte(version(rest)?));
        }
        if let Some(rest) = s.strip_prefix('>') {
            return Ok(VersionReq::Gt(version(rest)?));
        }
        if let Some(rest) = s.strip_prefix('<') {
            return Ok(VersionReq::Lt(version(rest)?));
        }
        if let Some(rest) = s.strip_prefix('~') {
            return Ok(VersionReq::Tilde(version(rest)?));
        }
        Ok(VersionReq::Exact(version(s)?))
    }

    /// Whether a version satisfies the expression.
    pub fn matches(&self, v: &Version) -> bool {
        match self {
            VersionReq::Exact(e) => v == e,
            VersionReq::Gt(e) => v > e,
            VersionReq::Gte(e) => v >= e,
            VersionReq::Lt(e) => v < e,
            VersionReq::Lte(e) => v <= e,
            VersionReq::Tilde(e) => {
                let upper = Version::new(e.major, e.minor + 1, 0);
                v >= e && *v < upper
            }
            VersionReq::Range(lo, hi) => v >= lo && v <= hi,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u32, minor: u32, patch: u32) -> Version {
        Version::new(major, minor, patch)
    }

    #[test]
    fn test_exact() {
        let req = VersionReq::parse("7.0.0").unwrap();
        assert!(req.matches(&v(7, 0, 0)));
        assert!(!req.matches(&v(7, 0, 1)));
    }

    #[test]
    fn test_comparators() {
        assert!(VersionReq::parse("<=7.0.0").unwrap().matches(&v(6, 9, 9)));
        assert!(VersionReq::parse("<=7.0.0").unwrap().matches(&v(7, 0, 0)));
        assert!(!VersionReq::parse("<=7.0.0").unwrap().matches(&v(7, 0, 1)));

        assert!(VersionReq::parse(">7").unwrap().matches(&v(7, 0, 1)));
        assert!(!VersionReq::parse(">7").unwrap().matches(&v(7, 0, 0)));

        assert!(VersionReq::parse(">=7.1").unwrap().matches(&v(7, 1, 0)));
        assert!(VersionReq::parse("<8").unwrap().matches(&v(7, 99, 0)));
        assert!(!VersionReq::parse("<8").unwrap().matches(&v(8, 0, 0)));
    }

    #[test]
    fn test_tilde() {
        let req = VersionReq::parse("~1.2.3").unwrap();
        assert!(!req.matches(&v(1, 2, 2)));
        assert!(req.matches(&v(1, 2, 3)));
        assert!(req.matches(&v(1, 2, 99)));
        assert!(!req.matches(&v(1, 3, 0)));
    }

    #[test]
    fn test_range() {
        let req = VersionReq::parse("1.0.0 - 2.0.0").unwrap();
        assert!(req.matches(&v(1, 0, 0)));
        assert!(req.matches(&v(1, 5, 0)));
        assert!(req.matches(&v(2, 0, 0)));
        assert!(!req.matches(&v(2, 0, 1)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(VersionReq::parse("").is_err());
        assert!(VersionReq::parse("<=banana").is_err());
        assert!(VersionReq::parse("1.0 - pear").is_err());
    }
}
