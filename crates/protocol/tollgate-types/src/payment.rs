//! Payment entity and amount conversions.
//!
//! Amounts are stored as integers in the method's base unit
//! (satoshis). Decimal strings only exist at the API boundary and are
//! converted with the `bitcoin` crate's exact parser; floating point
//! never touches a monetary value.

use bitcoin::amount::Denomination;
use bitcoin::Amount;
use serde::{Deserialize, Serialize};

use crate::enums::{AddressScheme, Network, PaymentMethod, PaymentStatus};
use crate::error::{Result, TypesError};
use crate::Timestamp;

/// Parse a decimal amount string into base units at the method's scale.
///
/// Rejects negative values, malformed strings, and excess precision.
pub fn amount_from_decimal(value: &str, method: PaymentMethod) -> Result<i64> {
    let denom = match method {
        PaymentMethod::Bitcoin => Denomination::Bitcoin,
    };
    let amount = Amount::from_str_in(value.trim(), denom)
        .map_err(|e| TypesError::invalid_amount(value, e.to_string()))?;
    i64::try_from(amount.to_sat())
        .map_err(|_| TypesError::invalid_amount(value, "amount out of range"))
}

/// Render base units as a decimal string at the method's scale.
pub fn amount_to_decimal(units: i64, method: PaymentMethod) -> Result<String> {
    let denom = match method {
        PaymentMethod::Bitcoin => Denomination::Bitcoin,
    };
    let sats = u64::try_from(units)
        .map_err(|_| TypesError::invalid_amount(units.to_string(), "amount is negative"))?;
    Ok(Amount::from_sat(sats).to_string_in(denom))
}

/// A payment demand issued to a banned visitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Payment {
    /// Row id, `None` until persisted.
    pub id: Option<i64>,
    /// Owning visitor row id.
    pub visitor_id: i64,
    /// Lifecycle status.
    pub status: PaymentStatus,
    /// Payment method.
    pub method: PaymentMethod,
    /// Network within the method.
    pub network: Network,
    /// Deposit address. Unique per method.
    pub address: String,
    /// How the address was produced.
    pub address_scheme: AddressScheme,
    /// Extended public key the address was derived from.
    pub xpub: String,
    /// Child index used for derivation.
    pub derive_index: u32,
    /// Amount demanded, base units. Always positive.
    pub amount_owed: i64,
    /// Amount seen on-chain so far, base units.
    pub amount_received: i64,
    /// Free-form detail payload.
    pub detail: serde_json::Value,
    /// Row creation time.
    pub created: Timestamp,
    /// Last modification time.
    pub updated: Option<Timestamp>,
    /// Deadline after which the demand lapses; `None` means it never
    /// does.
    pub expires: Option<Timestamp>,
}

impl Payment {
    /// Whether the demand has been met in full.
    pub fn is_paid(&self) -> bool {
        self.amount_owed > 0 && self.amount_received >= self.amount_owed
    }

    /// Amount owed as a decimal string.
    pub fn amount_owed_decimal(&self) -> Result<String> {
        amount_to_decimal(self.amount_owed, self.method)
    }

    /// Amount received as a decimal string.
    pub fn amount_received_decimal(&self) -> Result<String> {
        amount_to_decimal(self.amount_received, self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(owed: i64, received: i64) -> Payment {
        Payment {
            id: Some(1),
            visitor_id: 1,
            status: PaymentStatus::Pending,
            method: PaymentMethod::Bitcoin,
            network: Network::Testnet,
            address: "n1abc".to_string(),
            address_scheme: AddressScheme::HdPubkey,
            xpub: "xpub...".to_string(),
            derive_index: 0,
            amount_owed: owed,
            amount_received: received,
            detail: serde_json::json!({}),
            created: 0,
            updated: None,
            expires: None,
        }
    }

    #[test]
    fn test_amount_from_decimal_exact() {
        let sats = amount_from_decimal("0.05", PaymentMethod::Bitcoin).unwrap();
        assert_eq!(sats, 5_000_000);

        let sats = amount_from_decimal("0.00000001", PaymentMethod::Bitcoin).unwrap();
        assert_eq!(sats, 1);
    }

    #[test]
    fn test_amount_from_decimal_rejects_garbage() {
        assert!(amount_from_decimal("abc", PaymentMethod::Bitcoin).is_err());
        assert!(amount_from_decimal("-0.05", PaymentMethod::Bitcoin).is_err());
        // more precision than the method carries
        assert!(amount_from_decimal("0.000000001", PaymentMethod::Bitcoin).is_err());
    }

    #[test]
    fn test_amount_decimal_round_trip() {
        let s = amount_to_decimal(5_000_000, PaymentMethod::Bitcoin).unwrap();
        assert_eq!(
            amount_from_decimal(&s, PaymentMethod::Bitcoin).unwrap(),
            5_000_000
        );
        assert!(amount_to_decimal(-1, PaymentMethod::Bitcoin).is_err());
    }

    #[test]
    fn test_is_paid() {
        assert!(!payment(100, 0).is_paid());
        assert!(!payment(100, 99).is_paid());
        assert!(payment(100, 100).is_paid());
        assert!(payment(100, 150).is_paid());
        // a zero-owed row can never settle
        assert!(!payment(0, 100).is_paid());
    }
}
