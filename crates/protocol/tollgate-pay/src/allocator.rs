//! Payment allocation.
//!
//! At most one PENDING payment exists per visitor, method and network;
//! the allocator either returns it or (when asked) creates one inside
//! a single storage transaction, deriving a fresh address or
//! repurposing an expired row.

use tollgate_store::{NewPayment, PaymentStore, StoreError};
use tollgate_types::{AddressScheme, Network, Payment, PaymentMethod, Timestamp};

use crate::derive::HdAddressDeriver;
use crate::error::{PayError, Result};

/// How many derivation indexes to try when addresses collide.
const MAX_ALLOCATION_ATTEMPTS: u32 = 3;

/// Allocation policy for one payment method.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    pub method: PaymentMethod,
    pub network: Network,
    /// Amount demanded per payment, base units.
    pub amount_owed: i64,
    /// Demand lifetime; `None` never expires.
    pub expires_after_ms: Option<i64>,
    /// Repurpose expired rows before deriving fresh addresses. Note
    /// that a repurposed address may still be paid against an old
    /// invoice by its previous visitor.
    pub reuse_expired: bool,
    /// First derivation index when the database holds none.
    pub derive_index_start: u32,
}

/// Hands out pending payments backed by HD-derived addresses.
pub struct PaymentAllocator {
    deriver: HdAddressDeriver,
    config: AllocatorConfig,
}

impl PaymentAllocator {
    pub fn new(deriver: HdAddressDeriver, config: AllocatorConfig) -> Self {
        Self { deriver, config }
    }

    /// The allocation policy in force.
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// The visitor's open payment demand.
    ///
    /// Returns the existing PENDING payment when one exists. With
    /// `create` set, a missing demand is created; without it, `None`
    /// is returned.
    pub fn get_pending_payment(
        &self,
        payments: &dyn PaymentStore,
        visitor_id: i64,
        create: bool,
        now: Timestamp,
    ) -> Result<Option<Payment>> {
        if !create {
            return Ok(payments.find_pending(visitor_id, self.config.method, self.config.network)?);
        }

        let spec = NewPayment {
            visitor_id,
            method: self.config.method,
            network: self.config.network,
            address_scheme: AddressScheme::HdPubkey,
            xpub: self.deriver.xpub_string().to_string(),
            amount_owed: self.config.amount_owed,
            expires: self.config.expires_after_ms.map(|ms| now + ms),
            derive_index_start: self.config.derive_index_start,
        };
        let derive =
            |index: u32| -> std::result::Result<String, String> {
                self.deriver.derive(index).map_err(|e| e.to_string())
            };

        let payment = payments
            .get_or_create_pending(
                &spec,
                self.config.reuse_expired,
                MAX_ALLOCATION_ATTEMPTS,
                &derive,
                now,
            )
            .map_err(|e| match e {
                StoreError::AddressCollision { attempts } => {
                    PayError::AddressAllocation { attempts }
                }
                other => PayError::Store(other),
            })?;

        tracing::debug!(
            visitor_id,
            payment_id = payment.id,
            address = %payment.address,
            derive_index = payment.derive_index,
            "pending payment resolved"
        );
        Ok(Some(payment))
    }
}
