//! IP whitelist matching.
//!
//! Whitelisted ranges bypass the gate entirely: their visitors are
//! never stored and never detected. The default list covers the
//! reserved private and loopback blocks, so LAN and health-check
//! traffic is exempt out of the box.

use std::net::IpAddr;

use crate::error::{OpsError, Result};

/// One CIDR range (or single address) in the whitelist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpRange {
    net: u128,
    prefix: u8,
    /// Bit width of the address family, 32 or 128.
    width: u8,
}

fn to_bits(ip: &IpAddr) -> (u128, u8) {
    match ip {
        IpAddr::V4(v4) => (u32::from(*v4) as u128, 32),
        IpAddr::V6(v6) => (u128::from(*v6), 128),
    }
}

impl IpRange {
    /// Parse `"10.0.0.0/8"`, `"::1/128"` or a bare address.
    pub fn parse(s: &str) -> Result<Self> {
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => {
                let prefix: u8 = prefix
                    .parse()
                    .map_err(|_| OpsError::config(format!("bad CIDR prefix in {s:?}")))?;
                (addr, Some(prefix))
            }
            None => (s, None),
        };
        let ip: IpAddr = addr
            .parse()
            .map_err(|_| OpsError::config(format!("bad IP address in {s:?}")))?;
        let (net, width) = to_bits(&ip);
        let prefix = prefix.unwrap_or(width);
        if prefix > width {
            return Err(OpsError::config(format!("prefix too long in {s:?}")));
        }
        Ok(IpRange { net, prefix, width })
    }

    /// Whether the range contains `ip`. Ranges never match across
    /// address families.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        let (bits, width) = to_bits(ip);
        if width != self.width {
            return false;
        }
        if self.prefix == 0 {
            return true;
        }
        let shift = u32::from(self.width - self.prefix);
        (bits >> shift) == (self.net >> shift)
    }
}

/// The reserved private and local blocks whitelisted by default.
pub const DEFAULT_WHITELIST: &[&str] = &[
    "10.0.0.0/8",
    "127.0.0.0/8",
    "100.64.0.0/10",
    "172.16.0.0/12",
    "192.0.0.0/24",
    "192.168.0.0/16",
    "198.18.0.0/15",
    "::1/128",
    "fc00::/7",
];

/// Parse the default whitelist.
pub fn default_whitelist() -> Vec<IpRange> {
    // the table above is static and known-valid
    DEFAULT_WHITELIST
        .iter()
        .filter_map(|s| IpRange::parse(s).ok())
        .collect()
}

/// Whether any range contains `ip`.
pub fn is_whitelisted(ranges: &[IpRange], ip: &IpAddr) -> bool {
    ranges.iter().any(|r| r.contains(ip))
}
