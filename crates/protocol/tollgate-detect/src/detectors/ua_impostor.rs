//! Crawler impersonation detection.
//!
//! A user agent claiming to be a major crawler is verified by reverse
//! DNS: the IP must resolve to a hostname under the crawler's known
//! domains, and (for most crawlers) that hostname must resolve back to
//! the same IP. Agents that claim nothing are outside this detector's
//! scope and score inconclusive.

use std::sync::Arc;

use async_trait::async_trait;

use tollgate_types::Verdict;

use crate::detector::{DetectContext, Detector};
use crate::dns::DnsResolver;
use crate::error::Result;

/// At most this many reverse-DNS hostnames are inspected per visitor.
const REVERSE_HOSTNAME_LIMIT: usize = 10;

struct CrawlerDef {
    name: &'static str,
    /// Substrings that mark a user agent as claiming this crawler.
    ua_claims: &'static [&'static str],
    /// Hostname suffixes the crawler's IPs legitimately resolve to.
    hosts: &'static [&'static str],
    /// Whether the hostname must also resolve back to the IP.
    forward: bool,
}

const CRAWLERS: &[CrawlerDef] = &[
    CrawlerDef {
        name: "googlebot",
        ua_claims: &["Googlebot", "Mediapartners-Google", "AdsBot-Google"],
        hosts: &["googlebot.com", "google.com", "googleusercontent.com"],
        forward: true,
    },
    CrawlerDef {
        name: "yahoo",
        ua_claims: &["Yahoo! Slurp"],
        hosts: &["yahoo.com", "yahoo.net"],
        forward: true,
    },
    CrawlerDef {
        name: "bingbot",
        ua_claims: &["bingbot"],
        hosts: &["search.msn.com"],
        forward: true,
    },
    CrawlerDef {
        name: "yandex",
        ua_claims: &["http://yandex.com/bots"],
        hosts: &["yandex.ru", "yandex.net", "yandex.com"],
        forward: true,
    },
    CrawlerDef {
        // baidu has no forward records for its bot hostnames
        name: "baidu",
        ua_claims: &["http://www.baidu.com/search/spider.html"],
        hosts: &["crawl.baidu.com"],
        forward: false,
    },
    CrawlerDef {
        name: "uptimerobot",
        ua_claims: &["UptimeRobot"],
        hosts: &["uptimerobot.com"],
        forward: true,
    },
];

/// Verifies crawler identity claims through DNS.
pub struct UaImpostorDetector {
    dns: Arc<dyn DnsResolver>,
}

impl UaImpostorDetector {
    pub fn new(dns: Arc<dyn DnsResolver>) -> Self {
        Self { dns }
    }

    fn claimed_crawler(ua: &str) -> Option<&'static CrawlerDef> {
        CRAWLERS
            .iter()
            .find(|def| def.ua_claims.iter().any(|claim| ua.contains(claim)))
    }
}

#[async_trait]
impl Detector for UaImpostorDetector {
    fn name(&self) -> &'static str {
        "ua-impostor"
    }

    async fn check(&self, ctx: &mut DetectContext<'_>) -> Result<Verdict> {
        let Some(ua) = ctx.user_agent() else {
            return Ok(Verdict::Inconclusive);
        };
        let Some(def) = Self::claimed_crawler(ua) else {
            return Ok(Verdict::Inconclusive);
        };

        tracing::debug!(
            ip = %ctx.visitor.ip,
            crawler = def.name,
            "request claims to be a crawler, validating"
        );
        ctx.visitor.hostname = None;
        ctx.visitor.hostname_looked_up = true;

        let ip = ctx.visitor.ip.clone();
        let hostnames = self.dns.reverse(&ip).await?;

        let matched = hostnames
            .iter()
            .take(REVERSE_HOSTNAME_LIMIT)
            .find(|hostname| def.hosts.iter().any(|suffix| hostname.ends_with(suffix)));

        let Some(hostname) = matched else {
            return Ok(Verdict::Fail);
        };
        ctx.visitor.hostname = Some(hostname.clone());

        if !def.forward {
            return Ok(Verdict::Pass);
        }

        let addresses = self.dns.forward(hostname).await?;
        if addresses.iter().any(|a| *a == ip) {
            Ok(Verdict::Pass)
        } else {
            Ok(Verdict::Fail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::StaticDnsResolver;
    use tollgate_types::{Request, RequestSnapshot, Visitor};

    const GOOGLEBOT_UA: &str =
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
    const BAIDU_UA: &str =
        "Mozilla/5.0 (compatible; Baiduspider/2.0; +http://www.baidu.com/search/spider.html)";
    const GOOGLE_IP: &str = "66.249.66.1";
    const GOOGLE_HOST: &str = "crawl-66-249-66-1.googlebot.com";

    fn requests(ua: Option<&str>) -> Vec<Request> {
        vec![RequestSnapshot::get("/", ua).into_request(1, &["user-agent".to_string()], 0)]
    }

    async fn run(
        dns: StaticDnsResolver,
        ip: &str,
        ua: Option<&str>,
    ) -> (Verdict, Visitor) {
        let detector = UaImpostorDetector::new(Arc::new(dns));
        let mut visitor = Visitor::new(ip, 0).unwrap();
        let requests = requests(ua);
        let verdict = {
            let mut ctx = DetectContext {
                visitor: &mut visitor,
                requests: &requests,
                total_requests: 1,
                now: 0,
            };
            detector.check(&mut ctx).await.unwrap()
        };
        (verdict, visitor)
    }

    #[tokio::test]
    async fn test_genuine_googlebot_passes() {
        let dns = StaticDnsResolver::new()
            .with_reverse(GOOGLE_IP, &[GOOGLE_HOST])
            .with_forward(GOOGLE_HOST, &[GOOGLE_IP]);

        let (verdict, visitor) = run(dns, GOOGLE_IP, Some(GOOGLEBOT_UA)).await;
        assert_eq!(verdict, Verdict::Pass);
        assert_eq!(visitor.hostname.as_deref(), Some(GOOGLE_HOST));
        assert!(visitor.hostname_looked_up);
    }

    #[tokio::test]
    async fn test_impostor_fails_reverse() {
        // claims googlebot but resolves to an unrelated host
        let dns = StaticDnsResolver::new()
            .with_reverse("203.0.113.7", &["host7.cheap-vps.example"]);

        let (verdict, visitor) = run(dns, "203.0.113.7", Some(GOOGLEBOT_UA)).await;
        assert_eq!(verdict, Verdict::Fail);
        assert_eq!(visitor.hostname, None);
    }

    #[tokio::test]
    async fn test_impostor_fails_forward() {
        // reverse record spoofed to a google name, forward does not map back
        let dns = StaticDnsResolver::new()
            .with_reverse("203.0.113.7", &[GOOGLE_HOST])
            .with_forward(GOOGLE_HOST, &[GOOGLE_IP]);

        let (verdict, _) = run(dns, "203.0.113.7", Some(GOOGLEBOT_UA)).await;
        assert_eq!(verdict, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_baidu_skips_forward_lookup() {
        let dns = StaticDnsResolver::new()
            .with_reverse("180.76.15.1", &["baiduspider-180-76-15-1.crawl.baidu.com"]);

        let (verdict, _) = run(dns, "180.76.15.1", Some(BAIDU_UA)).await;
        assert_eq!(verdict, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_no_claim_is_inconclusive() {
        let (verdict, visitor) = run(
            StaticDnsResolver::new(),
            "203.0.113.7",
            Some("Mozilla/5.0 Firefox/121.0"),
        )
        .await;
        assert_eq!(verdict, Verdict::Inconclusive);
        assert!(!visitor.hostname_looked_up);
    }

    #[tokio::test]
    async fn test_no_user_agent_is_inconclusive() {
        let (verdict, _) = run(StaticDnsResolver::new(), "203.0.113.7", None).await;
        assert_eq!(verdict, Verdict::Inconclusive);
    }

    #[tokio::test]
    async fn test_suffix_must_anchor_at_end() {
        // "googlebot.com.evil.example" must not count as googlebot.com
        let dns = StaticDnsResolver::new()
            .with_reverse("203.0.113.7", &["googlebot.com.evil.example"]);

        let (verdict, _) = run(dns, "203.0.113.7", Some(GOOGLEBOT_UA)).await;
        assert_eq!(verdict, Verdict::Fail);
    }
}
