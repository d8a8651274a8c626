//! Self-identified bot detection.
//!
//! Most crawlers say what they are. This detector checks the newest
//! request's user agent against a crawler marker table and the parsed
//! device family. It always reaches a decision, never inconclusive.

use async_trait::async_trait;

use tollgate_types::Verdict;

use crate::detector::{DetectContext, Detector};
use crate::error::Result;
use crate::ua;

/// Detects user agents that declare themselves as bots.
pub struct UaBotDetector {
    /// Case-insensitive substrings that force a Pass even when the
    /// agent looks like a crawler. For operators who welcome specific
    /// bots.
    pub exclude: Vec<String>,
    /// Treat a missing or blank user agent as a bot.
    pub empty_is_bot: bool,
    /// Also fail agents whose family cannot be recognized at all.
    pub aggressive: bool,
}

impl Default for UaBotDetector {
    fn default() -> Self {
        UaBotDetector {
            exclude: Vec::new(),
            empty_is_bot: true,
            aggressive: false,
        }
    }
}

#[async_trait]
impl Detector for UaBotDetector {
    fn name(&self) -> &'static str {
        "ua-bot"
    }

    async fn check(&self, ctx: &mut DetectContext<'_>) -> Result<Verdict> {
        let ua = ctx.user_agent().unwrap_or("");
        if ua.trim().is_empty() {
            return Ok(if self.empty_is_bot {
                Verdict::Fail
            } else {
                Verdict::Pass
            });
        }

        let lower = ua.to_lowercase();
        if self
            .exclude
            .iter()
            .any(|ex| lower.contains(&ex.to_lowercase()))
        {
            tracing::debug!(ip = %ctx.visitor.ip, "user agent excluded from bot check");
            return Ok(Verdict::Pass);
        }

        if ua::looks_like_crawler(ua) {
            return Ok(Verdict::Fail);
        }

        let parsed = ua::parse(ua);
        if parsed.family == "spider" {
            return Ok(Verdict::Fail);
        }
        if self.aggressive && parsed.family == "other" {
            return Ok(Verdict::Fail);
        }

        Ok(Verdict::Pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_types::{Request, RequestSnapshot, Visitor};

    const FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const GOOGLEBOT: &str =
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    fn requests(ua: Option<&str>) -> Vec<Request> {
        vec![RequestSnapshot::get("/", ua).into_request(1, &["user-agent".to_string()], 0)]
    }

    async fn run(detector: &UaBotDetector, ua: Option<&str>) -> Verdict {
        let mut visitor = Visitor::new("203.0.113.7", 0).unwrap();
        let requests = requests(ua);
        let mut ctx = DetectContext {
            visitor: &mut visitor,
            requests: &requests,
            total_requests: 1,
            now: 0,
        };
        detector.check(&mut ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_browser_passes() {
        assert_eq!(run(&UaBotDetector::default(), Some(FIREFOX)).await, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_crawler_fails() {
        assert_eq!(
            run(&UaBotDetector::default(), Some(GOOGLEBOT)).await,
            Verdict::Fail
        );
        assert_eq!(
            run(&UaBotDetector::default(), Some("curl/8.4.0")).await,
            Verdict::Fail
        );
    }

    #[tokio::test]
    async fn test_empty_ua() {
        assert_eq!(run(&UaBotDetector::default(), None).await, Verdict::Fail);
        assert_eq!(run(&UaBotDetector::default(), Some("  ")).await, Verdict::Fail);

        let lenient = UaBotDetector {
            empty_is_bot: false,
            ..Default::default()
        };
        assert_eq!(run(&lenient, None).await, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_exclude_forces_pass() {
        let detector = UaBotDetector {
            exclude: vec!["GoogleBot".to_string()],
            ..Default::default()
        };
        assert_eq!(run(&detector, Some(GOOGLEBOT)).await, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_aggressive_fails_unknown_family() {
        let detector = UaBotDetector {
            aggressive: true,
            ..Default::default()
        };
        assert_eq!(
            run(&detector, Some("totally unrecognizable agent")).await,
            Verdict::Fail
        );
        assert_eq!(
            run(&UaBotDetector::default(), Some("totally unrecognizable agent")).await,
            Verdict::Pass
        );
    }
}
