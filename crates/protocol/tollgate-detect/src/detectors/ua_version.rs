//! Obsolete-client detection.
//!
//! The rule table maps browser families to *unwanted* version ranges;
//! a version inside the range fails. Real users do not browse with
//! IE 7, but bots replaying ancient user agents do. Families outside
//! the table score inconclusive.

use std::collections::HashMap;

use async_trait::async_trait;

use tollgate_types::Verdict;

use crate::detector::{DetectContext, Detector};
use crate::error::Result;
use crate::ua;
use crate::version_req::VersionReq;

/// Fails user agents advertising versions no live human runs.
pub struct UaVersionDetector {
    /// family -> range of versions to reject
    pub rules: HashMap<String, VersionReq>,
    /// family -> canonical family ("firefox alpha" -> "firefox")
    pub aliases: HashMap<String, String>,
}

impl Default for UaVersionDetector {
    fn default() -> Self {
        let mut rules = HashMap::new();
        rules.insert(
            "ie".to_string(),
            VersionReq::Lte(ua::Version::new(7, 0, 0)),
        );

        let mut aliases = HashMap::new();
        aliases.insert("firefox alpha".to_string(), "firefox".to_string());
        aliases.insert("firefox beta".to_string(), "firefox".to_string());

        UaVersionDetector { rules, aliases }
    }
}

#[async_trait]
impl Detector for UaVersionDetector {
    fn name(&self) -> &'static str {
        "ua-version"
    }

    async fn check(&self, ctx: &mut DetectContext<'_>) -> Result<Verdict> {
        let Some(ua) = ctx.user_agent() else {
            return Ok(Verdict::Inconclusive);
        };

        let parsed = ua::parse(ua);
        let family = self
            .aliases
            .get(&parsed.family)
            .unwrap_or(&parsed.family);

        let Some(rejected) = self.rules.get(family) else {
            return Ok(Verdict::Inconclusive);
        };
        let Some(version) = parsed.version else {
            return Ok(Verdict::Inconclusive);
        };

        if rejected.matches(&version) {
            tracing::debug!(ip = %ctx.visitor.ip, family = %family, version = %version,
                "user agent advertises a rejected version");
            Ok(Verdict::Fail)
        } else {
            Ok(Verdict::Pass)
        }
    }
}
