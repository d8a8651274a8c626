//! Enumeration types.
//!
//! Every enum with a `code()` method is persisted by that integer
//! code; the codes are part of the on-disk format.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypesError};

/// Administrative status assigned to a visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum VisitorStatus {
    /// Always admitted; detection is skipped.
    Whitelisted = 1,
    /// Admitted, typically after passing detection or paying.
    Allowed = 2,
    /// Always refused.
    Blacklisted = 3,
    /// Refused, but may regain access by paying.
    Banned = 4,
    /// Refused and served deliberately degraded responses.
    Shitlisted = 5,
}

impl VisitorStatus {
    /// Database code for this status.
    pub fn code(&self) -> i64 {
        *self as i64
    }

    /// Look up a status by database code.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(VisitorStatus::Whitelisted),
            2 => Ok(VisitorStatus::Allowed),
            3 => Ok(VisitorStatus::Blacklisted),
            4 => Ok(VisitorStatus::Banned),
            5 => Ok(VisitorStatus::Shitlisted),
            other => Err(TypesError::unknown_code("visitor_status", other)),
        }
    }

    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitorStatus::Whitelisted => "whitelisted",
            VisitorStatus::Allowed => "allowed",
            VisitorStatus::Blacklisted => "blacklisted",
            VisitorStatus::Banned => "banned",
            VisitorStatus::Shitlisted => "shitlisted",
        }
    }

    /// Whether this status refuses the visitor.
    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            VisitorStatus::Blacklisted | VisitorStatus::Banned | VisitorStatus::Shitlisted
        )
    }
}

impl std::fmt::Display for VisitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a payment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PaymentStatus {
    /// Fully paid.
    Settled = 1,
    /// Awaiting funds.
    Pending = 2,
    /// Deadline passed without full payment.
    Expired = 3,
}

impl PaymentStatus {
    /// Database code for this status.
    pub fn code(&self) -> i64 {
        *self as i64
    }

    /// Look up a status by database code.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(PaymentStatus::Settled),
            2 => Ok(PaymentStatus::Pending),
            3 => Ok(PaymentStatus::Expired),
            other => Err(TypesError::unknown_code("payment_status", other)),
        }
    }

    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Settled => "settled",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PaymentMethod {
    Bitcoin = 1,
}

impl PaymentMethod {
    /// Database code for this method.
    pub fn code(&self) -> i64 {
        *self as i64
    }

    /// Look up a method by database code.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(PaymentMethod::Bitcoin),
            other => Err(TypesError::unknown_code("payment_method", other)),
        }
    }

    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Bitcoin => "bitcoin",
        }
    }

    /// ISO-style currency code.
    pub fn currency_code(&self) -> &'static str {
        match self {
            PaymentMethod::Bitcoin => "BTC",
        }
    }

    /// Decimal places between the display unit and the base unit.
    pub fn decimals(&self) -> u32 {
        match self {
            PaymentMethod::Bitcoin => 8,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network within a payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Network {
    Livenet = 1,
    Testnet = 2,
}

impl Network {
    /// Database code for this network.
    pub fn code(&self) -> i64 {
        *self as i64
    }

    /// Look up a network by database code.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(Network::Livenet),
            2 => Ok(Network::Testnet),
            other => Err(TypesError::unknown_code("network", other)),
        }
    }

    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Livenet => "livenet",
            Network::Testnet => "testnet",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a payment address was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AddressScheme {
    /// Derived from a hierarchical-deterministic extended public key.
    HdPubkey = 1,
}

impl AddressScheme {
    /// Database code for this scheme.
    pub fn code(&self) -> i64 {
        *self as i64
    }

    /// Look up a scheme by database code.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(AddressScheme::HdPubkey),
            other => Err(TypesError::unknown_code("address_scheme", other)),
        }
    }
}

/// Outcome of a single detector.
///
/// `Inconclusive` is a first-class verdict: it neither admits nor
/// refuses, and the pipeline treats detector failures as this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The visitor looks human (or is a verified legitimate crawler).
    Pass,
    /// The visitor looks like a bot.
    Fail,
    /// No determination could be made.
    Inconclusive,
}

impl Verdict {
    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Fail => "fail",
            Verdict::Inconclusive => "inconclusive",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
