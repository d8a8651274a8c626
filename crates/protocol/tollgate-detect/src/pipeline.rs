//! The detector pipeline.
//!
//! Detectors run strictly in order. The first decisive verdict under
//! its policy stops the run: a Pass with `allow_on_pass` allows the
//! visitor, a Fail with `ban_on_fail` bans them. An inconclusive
//! verdict resets the visitor to unknown and the run continues, so a
//! later detector (or a later run) gets a clean slate. Detector
//! errors are logged and scored inconclusive; one broken heuristic
//! must not take the gate down.
//!
//! The pipeline mutates the visitor in memory only. Persisting the
//! result is the caller's job, once, after the run.

use tollgate_types::{Request, StatusUntil, Timestamp, Verdict, Visitor, VisitorStatus};

use crate::detector::{Detector, DetectorPolicy};
use crate::DetectContext;

/// A detector with its pipeline policy.
pub struct PipelineEntry {
    pub detector: Box<dyn Detector>,
    pub policy: DetectorPolicy,
}

/// One detector's verdict within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorResult {
    pub name: String,
    pub verdict: Verdict,
}

/// The outcome of a full pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// The last decisive verdict seen, whether or not it stopped the
    /// run. `None` when every detector came back inconclusive.
    pub passed: Option<bool>,
    /// Name of the detector whose verdict stopped the run, if any.
    pub decided_by: Option<String>,
    /// Every verdict recorded, in execution order.
    pub results: Vec<DetectorResult>,
}

/// An ordered set of detectors plus the status durations to apply.
pub struct Pipeline {
    entries: Vec<PipelineEntry>,
    /// How long an allow verdict admits the visitor. `None` = forever.
    allowed_duration_ms: Option<i64>,
    /// How long a ban verdict blocks the visitor. `None` = forever.
    ban_duration_ms: Option<i64>,
}

impl Pipeline {
    /// Build a pipeline: disabled entries are dropped, the rest are
    /// sorted by ascending policy order.
    pub fn new(
        entries: Vec<PipelineEntry>,
        allowed_duration_ms: Option<i64>,
        ban_duration_ms: Option<i64>,
    ) -> Self {
        let mut entries: Vec<PipelineEntry> =
            entries.into_iter().filter(|e| e.policy.enabled).collect();
        entries.sort_by_key(|e| e.policy.order);
        Pipeline {
            entries,
            allowed_duration_ms,
            ban_duration_ms,
        }
    }

    /// Number of active detectors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no detectors are active.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn until(duration_ms: Option<i64>) -> StatusUntil {
        match duration_ms {
            Some(ms) => StatusUntil::After(ms),
            None => StatusUntil::Never,
        }
    }

    /// Run every detector against the visitor.
    pub async fn run(
        &self,
        visitor: &mut Visitor,
        requests: &[Request],
        total_requests: u64,
        now: Timestamp,
    ) -> PipelineOutcome {
        let mut results = Vec::with_capacity(self.entries.len());
        let mut decided_by = None;
        let mut passed = None;

        for entry in &self.entries {
            let name = entry.detector.name();
            let verdict = {
                let mut ctx = DetectContext {
                    visitor,
                    requests,
                    total_requests,
                    now,
                };
                match entry.detector.check(&mut ctx).await {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(detector = name, error = %e,
                            "detector failed, scoring inconclusive");
                        Verdict::Inconclusive
                    }
                }
            };
            tracing::debug!(detector = name, verdict = %verdict, ip = %visitor.ip,
                "detector verdict");
            results.push(DetectorResult {
                name: name.to_string(),
                verdict,
            });

            match verdict {
                Verdict::Pass if entry.policy.allow_on_pass => {
                    visitor.set_status(
                        VisitorStatus::Allowed,
                        Some(name),
                        Self::until(self.allowed_duration_ms),
                        now,
                    );
                    decided_by = Some(name.to_string());
                    passed = Some(true);
                    break;
                }
                Verdict::Fail if entry.policy.ban_on_fail => {
                    visitor.set_status(
                        VisitorStatus::Banned,
                        Some(name),
                        Self::until(self.ban_duration_ms),
                        now,
                    );
                    decided_by = Some(name.to_string());
                    passed = Some(false);
                    break;
                }
                Verdict::Inconclusive => {
                    visitor.reset_status(now);
                }
                // undecorated Pass/Fail is recorded but not acted on
                Verdict::Pass => passed = Some(true),
                Verdict::Fail => passed = Some(false),
            }
        }

        PipelineOutcome {
            passed,
            decided_by,
            results,
        }
    }
}
