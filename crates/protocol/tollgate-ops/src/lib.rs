//! The Tollgate admission-control engine.
//!
//! Composes the storage, detection and payment crates into a single
//! [`Gate`]: call [`Gate::check`] to learn whether an IP may pass,
//! [`Gate::observe`] to record a request and re-score the visitor, and
//! [`Gate::evaluate`] for both. Banned visitors can buy their way back
//! in through a payment demand; [`Gate::run_payment_check`] reconciles
//! open demands against received funds.
//!
//! # Module Organization
//!
//! - [`engine`] - The `Gate` and its decisions
//! - [`config`] - Validated configuration with defaults
//! - [`allowlist`] - CIDR whitelist matching
//! - [`event`] - The `EventSink` seam and gate events
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tollgate_detect::StaticDnsResolver;
//! use tollgate_ops::{Gate, GateConfig};
//! use tollgate_store::GateState;
//!
//! let config = GateConfig::default().without_payments();
//! let state = GateState::open_in_memory().expect("open store");
//! let gate = Gate::new(config, state, Arc::new(StaticDnsResolver::new())).unwrap();
//! assert!(gate.check("203.0.113.7", 0).unwrap().is_allowed());
//! ```

pub mod allowlist;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;

pub use allowlist::{default_whitelist, IpRange, DEFAULT_WHITELIST};
pub use config::{
    DetectorConfigs, GateConfig, PaymentConfig, PruneConfig, RateLimitConfig, UaBotConfig,
    UaImpostorConfig, UaSwitchingConfig, UaVersionConfig,
};
pub use engine::{Decision, Gate, ObserveOutcome, PruneOutcome};
pub use error::{OpsError, Result};
pub use event::{EventSink, GateEvent, NoopSink, SinkHooks};
