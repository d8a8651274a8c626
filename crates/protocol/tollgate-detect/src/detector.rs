//! Detector trait and shared context.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tollgate_types::{Request, Timestamp, Verdict, Visitor};

use crate::error::Result;

/// Everything a detector may inspect for one visitor.
///
/// `requests` is newest-first; `requests[0]` is the request that
/// triggered this run. `total_requests` is the full number of rows
/// held for the visitor, which can exceed `requests.len()`.
pub struct DetectContext<'a> {
    pub visitor: &'a mut Visitor,
    pub requests: &'a [Request],
    pub total_requests: u64,
    pub now: Timestamp,
}

impl DetectContext<'_> {
    /// User agent of the newest request.
    pub fn user_agent(&self) -> Option<&str> {
        self.requests.first().and_then(Request::user_agent)
    }
}

/// One classification heuristic.
///
/// Detectors may annotate the visitor (hostname lookups do) but must
/// not persist anything; the pipeline's caller saves the visitor once
/// after the run.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Stable name, used as the status reason when this detector decides.
    fn name(&self) -> &'static str;

    /// Score the visitor.
    async fn check(&self, ctx: &mut DetectContext<'_>) -> Result<Verdict>;
}

/// How the pipeline reacts to a detector's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorPolicy {
    /// Disabled detectors are dropped when the pipeline is built.
    pub enabled: bool,
    /// Ascending execution order.
    pub order: u32,
    /// A Pass immediately allows the visitor and stops the run.
    pub allow_on_pass: bool,
    /// A Fail immediately bans the visitor and stops the run.
    pub ban_on_fail: bool,
}

impl DetectorPolicy {
    /// Record-only policy at the given order.
    pub fn recording(order: u32) -> Self {
        DetectorPolicy {
            enabled: true,
            order,
            allow_on_pass: false,
            ban_on_fail: false,
        }
    }

    /// Ban-on-fail policy at the given order.
    pub fn banning(order: u32) -> Self {
        DetectorPolicy {
            enabled: true,
            order,
            allow_on_pass: false,
            ban_on_fail: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_types::RequestSnapshot;

    #[test]
    fn test_context_user_agent() {
        let mut visitor = Visitor::new("203.0.113.7", 0).unwrap();
        let requests = vec![
            RequestSnapshot::get("/", Some("newest")).into_request(
                1,
                &["user-agent".to_string()],
                0,
            ),
            RequestSnapshot::get("/", Some("older")).into_request(
                1,
                &["user-agent".to_string()],
                0,
            ),
        ];
        let ctx = DetectContext {
            visitor: &mut visitor,
            requests: &requests,
            total_requests: 2,
            now: 0,
        };
        assert_eq!(ctx.user_agent(), Some("newest"));
    }

    #[test]
    fn test_policy_constructors() {
        let p = DetectorPolicy::banning(2);
        assert!(p.enabled && p.ban_on_fail && !p.allow_on_pass);
        assert_eq!(p.order, 2);

        let p = DetectorPolicy::recording(3);
        assert!(p.enabled && !p.ban_on_fail && !p.allow_on_pass);
    }
}
