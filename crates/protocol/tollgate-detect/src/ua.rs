//! Minimal user-agent parsing.
//!
//! Tollgate only needs three facts about a user agent: does it look
//! like a crawler, what browser family is it, and what version. A full
//! regex-database parser would be wasted here, so this module carries
//! a condensed crawler substring table and a handful of family rules.

use serde::{Deserialize, Serialize};

/// Substrings that mark a user agent as an automated client.
/// Matched case-insensitively anywhere in the string.
const CRAWLER_MARKERS: &[&str] = &[
    "bot",
    "crawler",
    "crawl",
    "spider",
    "slurp",
    "mediapartners",
    "archiver",
    "facebookexternalhit",
    "feedfetcher",
    "headless",
    "phantomjs",
    "scrapy",
    "wget",
    "curl",
    "libwww",
    "httpclient",
    "python-requests",
    "python-urllib",
    "go-http-client",
    "okhttp",
    "java/",
    "pingdom",
    "uptimerobot",
    "monitoring",
    "lighthouse",
    "siteaudit",
    "dataprovider",
    "scanner",
];

/// A three-part version number. Missing parts read as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Version {
            major,
            minor,
            patch,
        }
    }

    /// Parse the leading `major[.minor[.patch]]` of a version token,
    /// ignoring any trailing qualifier ("121.0a1" parses as 121.0.0).
    pub fn parse(s: &str) -> Option<Self> {
        let numeric: String = s
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let mut parts = numeric.split('.').filter(|p| !p.is_empty());
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Some(Version::new(major, minor, patch))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The browser family and version pulled out of a user agent.
///
/// `family` is a lowercase canonical name ("firefox", "chrome",
/// "safari", "opera", "edge", "ie"), `"spider"` for crawler-looking
/// agents, or `"other"` when nothing matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUserAgent {
    pub family: String,
    pub version: Option<Version>,
}

/// Whether the user agent carries a crawler marker.
pub fn looks_like_crawler(ua: &str) -> bool {
    let lower = ua.to_lowercase();
    CRAWLER_MARKERS.iter().any(|m| lower.contains(m))
}

fn version_after<'a>(lower: &'a str, token: &str) -> Option<&'a str> {
    let start = lower.find(token)? + token.len();
    let rest = &lower[start..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == ';' || c == ')')
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Parse a user agent into family and version.
pub fn parse(ua: &str) -> ParsedUserAgent {
    let lower = ua.to_lowercase();

    if looks_like_crawler(ua) {
        return ParsedUserAgent {
            family: "spider".to_string(),
            version: None,
        };
    }

    // order matters: edge and opera embed chrome tokens, chrome embeds
    // a safari token
    if let Some(v) = version_after(&lower, "edg/").or_else(|| version_after(&lower, "edge/")) {
        return ParsedUserAgent {
            family: "edge".to_string(),
            version: Version::parse(v),
        };
    }
    if let Some(v) = version_after(&lower, "opr/").or_else(|| version_after(&lower, "opera/")) {
        return ParsedUserAgent {
            family: "opera".to_string(),
            version: Version::parse(v),
        };
    }
    if let Some(v) = version_after(&lower, "firefox/") {
        // prerelease firefox advertises an a/b qualifier in its version
        let family = if v.contains('a') {
            "firefox alpha"
        } else if v.contains('b') {
            "firefox beta"
        } else {
            "firefox"
        };
        return ParsedUserAgent {
            family: family.to_string(),
            version: Version::parse(v),
        };
    }
    if let Some(v) = version_after(&lower, "msie ") {
        return ParsedUserAgent {
            family: "ie".to_string(),
            version: Version::parse(v),
        };
    }
    if lower.contains("trident/") {
        let version = version_after(&lower, "rv:").and_then(Version::parse);
        return ParsedUserAgent {
            family: "ie".to_string(),
            version,
        };
    }
    if let Some(v) = version_after(&lower, "chrome/") {
        return ParsedUserAgent {
            family: "chrome".to_string(),
            version: Version::parse(v),
        };
    }
    if lower.contains("safari/") {
        let version = version_after(&lower, "version/").and_then(Version::parse);
        return ParsedUserAgent {
            family: "safari".to_string(),
            version,
        };
    }

    ParsedUserAgent {
        family: "other".to_string(),
        version: None,
    }
}
