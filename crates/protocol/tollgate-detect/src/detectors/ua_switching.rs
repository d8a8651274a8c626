//! User-agent rotation detection.
//!
//! Bots that rotate their user agent on every request give themselves
//! away: inside a short window, every single request carries a
//! different agent string. Humans never do that. This detector only
//! fails on a perfect rotation; any repeat at all passes.

use std::collections::HashSet;

use async_trait::async_trait;

use tollgate_types::Verdict;

use crate::detector::{DetectContext, Detector};
use crate::error::Result;

/// Detects visitors whose every request carries a distinct user agent.
pub struct UaSwitchingDetector {
    /// Below this many total requests the visitor always passes.
    pub min_requests: u64,
    /// At most this many newest requests are inspected.
    pub max_requests: usize,
    /// Only requests within this window of the newest one count.
    pub timeframe_ms: i64,
}

impl Default for UaSwitchingDetector {
    fn default() -> Self {
        UaSwitchingDetector {
            min_requests: 5,
            max_requests: 20,
            timeframe_ms: 5 * 60 * 1000,
        }
    }
}

#[async_trait]
impl Detector for UaSwitchingDetector {
    fn name(&self) -> &'static str {
        "ua-switching"
    }

    async fn check(&self, ctx: &mut DetectContext<'_>) -> Result<Verdict> {
        if ctx.total_requests < self.min_requests {
            return Ok(Verdict::Pass);
        }
        let Some(newest) = ctx.requests.first() else {
            return Ok(Verdict::Pass);
        };

        let cutoff = newest.requested - self.timeframe_ms;
        let agents: Vec<&str> = ctx
            .requests
            .iter()
            .take(self.max_requests)
            .filter(|r| r.requested >= cutoff)
            .map(|r| r.user_agent().unwrap_or(""))
            .collect();

        if agents.len() <= 1 || (agents.len() as u64) < self.min_requests {
            return Ok(Verdict::Pass);
        }

        let unique: HashSet<&str> = agents.iter().copied().collect();
        if unique.len() == agents.len() {
            tracing::debug!(ip = %ctx.visitor.ip, inspected = agents.len(),
                "every inspected request carries a distinct user agent");
            Ok(Verdict::Fail)
        } else {
            Ok(Verdict::Pass)
        }
    }
}
