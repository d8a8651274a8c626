//! Visitor entity and status transitions.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::enums::VisitorStatus;
use crate::error::{Result, TypesError};
use crate::Timestamp;

/// When a status assignment stops applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUntil {
    /// The status never expires.
    Never,
    /// The status expires at an absolute timestamp.
    At(Timestamp),
    /// The status expires this many milliseconds after assignment.
    After(i64),
}

/// A visitor, keyed by IP address.
///
/// The status fields form a small state machine: a visitor with no
/// status is "unknown" and eligible for detection. Expiry is lazy;
/// nothing rewrites the row when a status lapses, readers go through
/// [`Visitor::effective_status`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Visitor {
    /// Row id, `None` until persisted.
    pub id: Option<i64>,
    /// The visitor's IP address (unique).
    pub ip: String,
    /// 4 or 6.
    pub ip_version: u8,
    /// Reverse-DNS hostname, when resolved.
    pub hostname: Option<String>,
    /// Assigned status, `None` for unknown visitors.
    pub status: Option<VisitorStatus>,
    /// Why the status was assigned (detector name, "paid", ...).
    pub status_reason: Option<String>,
    /// When the status fields were last written.
    pub status_set: Option<Timestamp>,
    /// When the status lapses; `None` means it never does.
    pub status_expires: Option<Timestamp>,
    /// Row creation time.
    pub created: Timestamp,
    /// Set once a reverse-DNS lookup has been attempted this run, so
    /// the engine does not repeat it. Not persisted.
    #[serde(skip)]
    pub hostname_looked_up: bool,
}

impl Visitor {
    /// Create an unpersisted visitor for an IP address.
    ///
    /// Fails when the IP does not parse.
    pub fn new(ip: &str, now: Timestamp) -> Result<Self> {
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| TypesError::validation(format!("invalid ip address: {ip}")))?;
        Ok(Visitor {
            id: None,
            ip: ip.to_string(),
            ip_version: match addr {
                IpAddr::V4(_) => 4,
                IpAddr::V6(_) => 6,
            },
            hostname: None,
            status: None,
            status_reason: None,
            status_set: None,
            status_expires: None,
            created: now,
            hostname_looked_up: false,
        })
    }

    /// Assign a status.
    ///
    /// Always stamps `status_set`, even when the new status equals the
    /// old one; throttling keys off that timestamp.
    pub fn set_status(
        &mut self,
        status: VisitorStatus,
        reason: Option<&str>,
        until: StatusUntil,
        now: Timestamp,
    ) {
        self.status = Some(status);
        self.status_reason = reason.map(str::to_string);
        self.status_set = Some(now);
        self.status_expires = match until {
            StatusUntil::Never => None,
            StatusUntil::At(ts) => Some(ts),
            StatusUntil::After(ms) => Some(now + ms),
        };
    }

    /// Clear the status back to unknown, stamping `status_set`.
    pub fn reset_status(&mut self, now: Timestamp) {
        self.status = None;
        self.status_reason = None;
        self.status_set = Some(now);
        self.status_expires = None;
    }

    /// The status currently in force, accounting for lazy expiry.
    ///
    /// Returns `None` once `status_expires` has passed; the stored row
    /// is left untouched.
    pub fn effective_status(&self, now: Timestamp) -> Option<VisitorStatus> {
        let status = self.status?;
        match self.status_expires {
            Some(expires) if expires <= now => None,
            _ => Some(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: Timestamp = 1_700_000_000_000;

    #[test]
    fn test_new_derives_ip_version() {
        let v4 = Visitor::new("203.0.113.7", NOW).unwrap();
        assert_eq!(v4.ip_version, 4);

        let v6 = Visitor::new("2001:db8::1", NOW).unwrap();
        assert_eq!(v6.ip_version, 6);

        assert!(Visitor::new("not-an-ip", NOW).is_err());
    }

    #[test]
    fn test_set_status_after_duration() {
        let mut v = Visitor::new("203.0.113.7", NOW).unwrap();
        v.set_status(
            VisitorStatus::Banned,
            Some("ua-bot"),
            StatusUntil::After(1000),
            NOW,
        );
        assert_eq!(v.status, Some(VisitorStatus::Banned));
        assert_eq!(v.status_reason.as_deref(), Some("ua-bot"));
        assert_eq!(v.status_set, Some(NOW));
        assert_eq!(v.status_expires, Some(NOW + 1000));
    }

    #[test]
    fn test_effective_status_lazy_expiry() {
        let mut v = Visitor::new("203.0.113.7", NOW).unwrap();
        v.set_status(VisitorStatus::Banned, None, StatusUntil::After(1000), NOW);

        assert_eq!(v.effective_status(NOW), Some(VisitorStatus::Banned));
        assert_eq!(
            v.effective_status(NOW + 999),
            Some(VisitorStatus::Banned),
            "still in force one tick before expiry"
        );
        assert_eq!(v.effective_status(NOW + 1000), None, "expiry is inclusive");
        // the stored fields are untouched
        assert_eq!(v.status, Some(VisitorStatus::Banned));
    }

    #[test]
    fn test_effective_status_never_expires() {
        let mut v = Visitor::new("203.0.113.7", NOW).unwrap();
        v.set_status(VisitorStatus::Whitelisted, None, StatusUntil::Never, NOW);
        assert_eq!(
            v.effective_status(NOW + i64::MAX / 2),
            Some(VisitorStatus::Whitelisted)
        );
    }

    #[test]
    fn test_reset_status_stamps_status_set() {
        let mut v = Visitor::new("203.0.113.7", NOW).unwrap();
        v.set_status(VisitorStatus::Allowed, Some("paid"), StatusUntil::Never, NOW);
        v.reset_status(NOW + 5);
        assert_eq!(v.status, None);
        assert_eq!(v.status_reason, None);
        assert_eq!(v.status_expires, None);
        assert_eq!(v.status_set, Some(NOW + 5));
    }

    #[test]
    fn test_absolute_expiry() {
        let mut v = Visitor::new("203.0.113.7", NOW).unwrap();
        v.set_status(
            VisitorStatus::Allowed,
            None,
            StatusUntil::At(NOW + 60_000),
            NOW,
        );
        assert_eq!(v.status_expires, Some(NOW + 60_000));
    }
}
