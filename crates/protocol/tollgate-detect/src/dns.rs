//! DNS resolution seam.
//!
//! Name resolution is an external collaborator: embedders hand the
//! crawler-verification detector whatever resolver their platform
//! provides. Implementations must map "no data" conditions (NXDOMAIN
//! and friends) to an empty result; only transport-level failures
//! should surface as errors.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

/// Forward and reverse DNS lookups.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Hostnames an IP address resolves back to.
    async fn reverse(&self, ip: &str) -> Result<Vec<String>>;

    /// Addresses a hostname resolves to.
    async fn forward(&self, host: &str) -> Result<Vec<String>>;
}

/// Table-backed resolver for tests and fixtures.
#[derive(Debug, Default, Clone)]
pub struct StaticDnsResolver {
    reverse: HashMap<String, Vec<String>>,
    forward: HashMap<String, Vec<String>>,
}

impl StaticDnsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reverse mapping.
    pub fn with_reverse(mut self, ip: &str, hosts: &[&str]) -> Self {
        self.reverse
            .insert(ip.to_string(), hosts.iter().map(|h| h.to_string()).collect());
        self
    }

    /// Register a forward mapping.
    pub fn with_forward(mut self, host: &str, ips: &[&str]) -> Self {
        self.forward
            .insert(host.to_string(), ips.iter().map(|i| i.to_string()).collect());
        self
    }
}

#[async_trait]
impl DnsResolver for StaticDnsResolver {
    async fn reverse(&self, ip: &str) -> Result<Vec<String>> {
        Ok(self.reverse.get(ip).cloned().unwrap_or_default())
    }

    async fn forward(&self, host: &str) -> Result<Vec<String>> {
        Ok(self.forward.get(host).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver_round_trip() {
        let dns = StaticDnsResolver::new()
            .with_reverse("66.249.66.1", &["crawl-66-249-66-1.googlebot.com"])
            .with_forward("crawl-66-249-66-1.googlebot.com", &["66.249.66.1"]);

        let hosts = dns.reverse("66.249.66.1").await.unwrap();
        assert_eq!(hosts, vec!["crawl-66-249-66-1.googlebot.com"]);

        let ips = dns.forward("crawl-66-249-66-1.googlebot.com").await.unwrap();
        assert_eq!(ips, vec!["66.249.66.1"]);

        assert!(dns.reverse("203.0.113.7").await.unwrap().is_empty());
    }
}
