//! Request rate limiting.
//!
//! Each rule says "no more than `total` requests per `timeframe_ms`".
//! With requests ordered newest first, the request at index `total`
//! is the (total+1)-th newest; if it exists and falls inside the
//! window ending at the newest request, the rule is tripped.

use async_trait::async_trait;

use tollgate_types::Verdict;

use crate::detector::{DetectContext, Detector};
use crate::error::Result;

/// One rate rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRule {
    /// Maximum allowed requests inside the window.
    pub total: usize,
    /// Window length in milliseconds.
    pub timeframe_ms: i64,
}

/// Fails visitors who exceed any configured request rate.
pub struct RateLimitDetector {
    pub rules: Vec<RateRule>,
}

impl Default for RateLimitDetector {
    fn default() -> Self {
        RateLimitDetector {
            rules: vec![RateRule {
                total: 50,
                timeframe_ms: 15 * 60 * 1000,
            }],
        }
    }
}

impl RateLimitDetector {
    /// How many newest requests must be in the context for all rules
    /// to be checkable.
    pub fn required_depth(&self) -> usize {
        self.rules
            .iter()
            .map(|r| r.total + 1)
            .max()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Detector for RateLimitDetector {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    async fn check(&self, ctx: &mut DetectContext<'_>) -> Result<Verdict> {
        let Some(newest) = ctx.requests.first() else {
            return Ok(Verdict::Pass);
        };

        for rule in &self.rules {
            if rule.total == 0 || rule.timeframe_ms <= 0 {
                tracing::warn!(total = rule.total, timeframe_ms = rule.timeframe_ms,
                    "malformed rate rule");
                return Ok(Verdict::Inconclusive);
            }

            if let Some(boundary) = ctx.requests.get(rule.total) {
                if boundary.requested >= newest.requested - rule.timeframe_ms {
                    tracing::debug!(ip = %ctx.visitor.ip, total = rule.total,
                        timeframe_ms = rule.timeframe_ms, "rate rule tripped");
                    return Ok(Verdict::Fail);
                }
            }
        }

        Ok(Verdict::Pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_types::{Request, RequestSnapshot, Timestamp, Visitor};

    const NOW: Timestamp = 1_700_000_000_000;

    fn burst(count: usize, spacing_ms: i64) -> Vec<Request> {
        (0..count)
            .map(|i| {
                let mut snap = RequestSnapshot::get("/", Some("ua"));
                snap.requested = Some(NOW - (i as i64) * spacing_ms);
                snap.into_request(1, &["user-agent".to_string()], NOW)
            })
            .collect()
    }

    async fn run(detector: &RateLimitDetector, requests: Vec<Request>) -> Verdict {
        let mut visitor = Visitor::new("203.0.113.7", 0).unwrap();
        let total = requests.len() as u64;
        let mut ctx = DetectContext {
            visitor: &mut visitor,
            requests: &requests,
            total_requests: total,
            now: NOW,
        };
        detector.check(&mut ctx).await.unwrap()
    }

    fn rule(total: usize, timeframe_ms: i64) -> RateLimitDetector {
        RateLimitDetector {
            rules: vec![RateRule {
                total,
                timeframe_ms,
            }],
        }
    }

    #[tokio::test]
    async fn test_burst_over_limit_fails() {
        // 11 requests 1ms apart against a 10-per-minute rule
        assert_eq!(run(&rule(10, 60_000), burst(11, 1)).await, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_under_limit_passes() {
        assert_eq!(run(&rule(10, 60_000), burst(10, 1)).await, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_slow_requests_pass() {
        // 11 requests spaced far wider than the window
        assert_eq!(
            run(&rule(10, 60_000), burst(11, 10_000)).await,
            Verdict::Pass
        );
    }

    #[tokio::test]
    async fn test_boundary_request_inside_window_fails() {
        let mut reqs = burst(10, 1);
        // the 11th newest sits exactly on the window edge
        let mut snap = RequestSnapshot::get("/", Some("ua"));
        snap.requested = Some(NOW - 60_000);
        reqs.push(snap.into_request(1, &["user-agent".to_string()], NOW));
        assert_eq!(run(&rule(10, 60_000), reqs).await, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_malformed_rule_is_inconclusive() {
        assert_eq!(
            run(&rule(0, 60_000), burst(5, 1)).await,
            Verdict::Inconclusive
        );
        assert_eq!(run(&rule(10, 0), burst(5, 1)).await, Verdict::Inconclusive);
    }

    #[tokio::test]
    async fn test_required_depth() {
        let d = RateLimitDetector {
            rules: vec![
                RateRule {
                    total: 10,
                    timeframe_ms: 1000,
                },
                RateRule {
                    total: 50,
                    timeframe_ms: 60_000,
                },
            ],
        };
        assert_eq!(d.required_depth(), 51);
    }
}
