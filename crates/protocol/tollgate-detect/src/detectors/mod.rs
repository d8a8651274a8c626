//! Built-in detectors.

pub mod rate_limit;
pub mod ua_bot;
pub mod ua_impostor;
pub mod ua_switching;
pub mod ua_version;

pub use rate_limit::{RateLimitDetector, RateRule};
pub use ua_bot::UaBotDetector;
pub use ua_impostor::UaImpostorDetector;
pub use ua_switching::UaSwitchingDetector;
pub use ua_version::UaVersionDetector;
