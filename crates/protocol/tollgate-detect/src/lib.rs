//! Bot-detection pipeline for the Tollgate admission-control engine.
//!
//! Visitors are classified by an ordered sequence of detectors, each
//! returning a tri-state verdict (pass, fail, inconclusive). The
//! pipeline applies per-detector policy: a decisive verdict can allow
//! or ban the visitor on the spot, everything else is recorded and
//! the run continues.
//!
//! # Module Organization
//!
//! - [`detector`] - The `Detector` trait, context and policy
//! - [`pipeline`] - Ordered execution with stop-on-decision
//! - [`detectors`] - The five built-in detectors
//! - [`ua`] - Minimal user-agent parsing
//! - [`version_req`] - Version range expressions
//! - [`dns`] - The `DnsResolver` seam
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```
//! use tollgate_detect::{DetectorPolicy, Pipeline, PipelineEntry};
//! use tollgate_detect::detectors::UaBotDetector;
//!
//! let pipeline = Pipeline::new(
//!     vec![PipelineEntry {
//!         detector: Box::new(UaBotDetector::default()),
//!         policy: DetectorPolicy::banning(0),
//!     }],
//!     Some(30 * 24 * 60 * 60 * 1000),
//!     Some(30 * 24 * 60 * 60 * 1000),
//! );
//! assert_eq!(pipeline.len(), 1);
//! ```

pub mod detector;
pub mod detectors;
pub mod dns;
pub mod error;
pub mod pipeline;
pub mod ua;
pub mod version_req;

pub use detector::{DetectContext, Detector, DetectorPolicy};
pub use dns::{DnsResolver, StaticDnsResolver};
pub use error::{DetectError, Result};
pub use pipeline::{DetectorResult, Pipeline, PipelineEntry, PipelineOutcome};
pub use ua::{ParsedUserAgent, Version};
pub use version_req::VersionReq;
