//! Gate configuration.
//!
//! `GateConfig` is plain data validated once up front; the engine
//! builds its pipeline and payment machinery from it and never reads
//! it again. Defaults match a reasonable public-facing deployment:
//! every detector on, private ranges whitelisted, thirty-day allow
//! and ban windows.

use std::collections::HashMap;

use tollgate_detect::detectors::RateRule;
use tollgate_detect::{DetectorPolicy, Version, VersionReq};
use tollgate_types::{Network, PaymentMethod};

use crate::allowlist::{default_whitelist, IpRange};
use crate::error::{OpsError, Result};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Self-identified bot detector settings.
#[derive(Debug, Clone)]
pub struct UaBotConfig {
    pub policy: DetectorPolicy,
    /// Agents containing any of these substrings always pass, so the
    /// impostor detector can vet them instead.
    pub exclude: Vec<String>,
    pub empty_is_bot: bool,
    pub aggressive: bool,
}

impl Default for UaBotConfig {
    fn default() -> Self {
        UaBotConfig {
            policy: DetectorPolicy::banning(0),
            exclude: ["google", "bingbot", "yandex", "yahoo", "baidu", "uptimerobot"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            empty_is_bot: true,
            aggressive: false,
        }
    }
}

/// Obsolete-client detector settings.
#[derive(Debug, Clone)]
pub struct UaVersionConfig {
    pub policy: DetectorPolicy,
    /// family -> range of versions to reject
    pub rules: HashMap<String, VersionReq>,
}

impl Default for UaVersionConfig {
    fn default() -> Self {
        let mut rules = HashMap::new();
        rules.insert("ie".to_string(), VersionReq::Lte(Version::new(7, 0, 0)));
        rules.insert(
            "firefox".to_string(),
            VersionReq::Lte(Version::new(30, 0, 0)),
        );
        rules.insert(
            "chrome".to_string(),
            VersionReq::Lte(Version::new(32, 0, 0)),
        );
        rules.insert(
            "safari".to_string(),
            VersionReq::Lte(Version::new(5, 1, 9)),
        );
        UaVersionConfig {
            policy: DetectorPolicy::banning(1),
            rules,
        }
    }
}

/// Crawler identity verification settings.
#[derive(Debug, Clone)]
pub struct UaImpostorConfig {
    pub policy: DetectorPolicy,
}

impl Default for UaImpostorConfig {
    fn default() -> Self {
        // a verified crawler is allowed on the spot, a fake one banned
        UaImpostorConfig {
            policy: DetectorPolicy {
                enabled: true,
                order: 2,
                allow_on_pass: true,
                ban_on_fail: true,
            },
        }
    }
}

/// User-agent rotation detector settings.
#[derive(Debug, Clone)]
pub struct UaSwitchingConfig {
    pub policy: DetectorPolicy,
    pub min_requests: u64,
    pub max_requests: usize,
    pub timeframe_ms: i64,
}

impl Default for UaSwitchingConfig {
    fn default() -> Self {
        UaSwitchingConfig {
            policy: DetectorPolicy::banning(3),
            min_requests: 5,
            max_requests: 20,
            timeframe_ms: 5 * 60 * 1000,
        }
    }
}

/// Rate-limit detector settings.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub policy: DetectorPolicy,
    pub rules: Vec<RateRule>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            policy: DetectorPolicy::banning(4),
            rules: vec![RateRule {
                total: 50,
                timeframe_ms: 15 * 60 * 1000,
            }],
        }
    }
}

/// Settings for every built-in detector.
#[derive(Debug, Clone, Default)]
pub struct DetectorConfigs {
    pub ua_bot: UaBotConfig,
    pub ua_version: UaVersionConfig,
    pub ua_impostor: UaImpostorConfig,
    pub ua_switching: UaSwitchingConfig,
    pub rate_limit: RateLimitConfig,
}

/// Payment demand settings.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Whether blocked visitors are offered a payment demand at all.
    pub enabled: bool,
    /// Extended public key deposit addresses derive from. Required
    /// when payments are enabled.
    pub xpub: Option<String>,
    pub method: PaymentMethod,
    pub network: Network,
    /// Amount demanded, base units.
    pub amount_owed: i64,
    /// How long a settled payment admits the visitor.
    pub allowed_duration_ms: Option<i64>,
    /// How long a demand stays payable.
    pub expires_after_ms: Option<i64>,
    /// Repurpose expired deposit addresses. Off by default: a visitor
    /// paying an old invoice late would credit someone else's address.
    pub reuse_expired: bool,
    pub derive_index_start: u32,
    /// Confirmations a deposit needs before it counts.
    pub min_confirmations: u32,
    /// Staleness timeout for the reconciliation lock.
    pub check_timeout_ms: i64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        PaymentConfig {
            enabled: true,
            xpub: None,
            method: PaymentMethod::Bitcoin,
            network: Network::Livenet,
            amount_owed: 5_000_000,
            allowed_duration_ms: Some(30 * DAY_MS),
            expires_after_ms: Some(3 * DAY_MS),
            reuse_expired: false,
            derive_index_start: 0,
            min_confirmations: 1,
            check_timeout_ms: 15 * 60 * 1000,
        }
    }
}

/// Database pruning settings.
#[derive(Debug, Clone)]
pub struct PruneConfig {
    /// Delete status-less visitors older than this. `None` disables
    /// pruning.
    pub older_than_ms: Option<i64>,
    /// Staleness timeout for the prune lock.
    pub timeout_ms: i64,
    /// Compact the database afterwards.
    pub vacuum: bool,
}

impl Default for PruneConfig {
    fn default() -> Self {
        PruneConfig {
            older_than_ms: Some(3 * DAY_MS),
            timeout_ms: 5 * 60 * 1000,
            vacuum: true,
        }
    }
}

/// Everything the gate needs to run.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// IP ranges that bypass the gate entirely.
    pub whitelist: Vec<IpRange>,
    /// Reverse-resolve visitor hostnames after detection.
    pub lookup_hostname: bool,
    /// Minimum ms between detection runs per visitor; 0 disables
    /// throttling.
    pub detect_frequency_ms: i64,
    /// Header names kept on stored requests (lowercase).
    pub retained_headers: Vec<String>,
    /// How long a detector allow verdict admits the visitor.
    pub allowed_duration_ms: Option<i64>,
    /// How long a detector ban verdict blocks the visitor.
    pub ban_duration_ms: Option<i64>,
    pub detectors: DetectorConfigs,
    pub payment: PaymentConfig,
    pub prune: PruneConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            whitelist: default_whitelist(),
            lookup_hostname: true,
            detect_frequency_ms: 1000,
            retained_headers: vec!["user-agent".to_string()],
            allowed_duration_ms: Some(30 * DAY_MS),
            ban_duration_ms: Some(30 * DAY_MS),
            detectors: DetectorConfigs::default(),
            payment: PaymentConfig::default(),
            prune: PruneConfig::default(),
        }
    }
}

impl GateConfig {
    /// Set the extended public key payments derive addresses from.
    pub fn with_xpub(mut self, xpub: impl Into<String>) -> Self {
        self.payment.xpub = Some(xpub.into());
        self
    }

    /// Set the payment network.
    pub fn with_network(mut self, network: Network) -> Self {
        self.payment.network = network;
        self
    }

    /// Set the detection throttle interval.
    pub fn with_detect_frequency_ms(mut self, ms: i64) -> Self {
        self.detect_frequency_ms = ms;
        self
    }

    /// Replace the IP whitelist.
    pub fn with_whitelist(mut self, ranges: Vec<IpRange>) -> Self {
        self.whitelist = ranges;
        self
    }

    /// Toggle the reverse-DNS hostname fill-in.
    pub fn with_lookup_hostname(mut self, lookup: bool) -> Self {
        self.lookup_hostname = lookup;
        self
    }

    /// Disable payment demands.
    pub fn without_payments(mut self) -> Self {
        self.payment.enabled = false;
        self
    }

    /// Check the configuration describes a runnable gate.
    pub fn validate(&self) -> Result<()> {
        if self.detect_frequency_ms < 0 {
            return Err(OpsError::config("detect_frequency_ms must be >= 0"));
        }
        if self.payment.enabled {
            if self.payment.xpub.is_none() {
                return Err(OpsError::config(
                    "payments are enabled but no extended public key is set",
                ));
            }
            if self.payment.amount_owed <= 0 {
                return Err(OpsError::config("payment amount_owed must be positive"));
            }
            if self.payment.check_timeout_ms <= 0 {
                return Err(OpsError::config("payment check_timeout_ms must be positive"));
            }
        }
        if self.prune.timeout_ms <= 0 {
            return Err(OpsError::config("prune timeout_ms must be positive"));
        }
        Ok(())
    }

    /// Deepest request window any detector may need.
    pub fn request_depth(&self) -> usize {
        let rate_depth = self
            .detectors
            .rate_limit
            .rules
            .iter()
            .map(|r| r.total + 1)
            .max()
            .unwrap_or(0);
        self.detectors.ua_switching.max_requests.max(rate_depth).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFj\
qJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";

    #[test]
    fn test_default_validates_with_xpub() {
        let config = GateConfig::default().with_xpub(XPUB);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_enabled_payments_require_xpub() {
        let config = GateConfig::default();
        assert!(config.validate().is_err());
        assert!(config.without_payments().validate().is_ok());
    }

    #[test]
    fn test_rejects_nonpositive_amount() {
        let mut config = GateConfig::default().with_xpub(XPUB);
        config.payment.amount_owed = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_depth_covers_rate_rules() {
        let config = GateConfig::default();
        // default rate rule is 50 per window, needing 51 rows
        assert_eq!(config.request_depth(), 51);

        let mut config = GateConfig::default();
        config.detectors.rate_limit.rules.clear();
        assert_eq!(config.request_depth(), 20, "switching window remains");
    }

    #[test]
    fn test_detector_orders_follow_defaults() {
        let d = DetectorConfigs::default();
        assert_eq!(d.ua_bot.policy.order, 0);
        assert_eq!(d.ua_version.policy.order, 1);
        assert_eq!(d.ua_impostor.policy.order, 2);
        assert!(d.ua_impostor.policy.allow_on_pass);
        assert_eq!(d.ua_switching.policy.order, 3);
        assert_eq!(d.rate_limit.policy.order, 4);
    }
}
