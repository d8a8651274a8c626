//! Settlement.
//!
//! A payment settles when the funds received reach the amount owed.
//! Settling flips the payment to SETTLED and the visitor to ALLOWED
//! ("paid") in one transaction; a half-paid demand only has its
//! received amount recorded.

use async_trait::async_trait;

use tollgate_store::{PaymentStore, StoreError, VisitorStore};
use tollgate_types::{Payment, PaymentStatus, StatusUntil, Timestamp, Visitor, VisitorStatus};

use crate::error::Result;

/// Observers of payment lifecycle transitions.
///
/// Hook failures must not exist: implementations are infallible and
/// settlement never depends on them.
#[async_trait]
pub trait PaymentHooks: Send + Sync {
    /// A reconciliation run acquired its lock and is about to scan.
    async fn check_started(&self) {}

    /// A payment reached its owed amount.
    async fn payment_settled(&self, _payment: &Payment, _visitor: &Visitor) {}

    /// A payment received funds below its owed amount.
    async fn payment_partial(&self, _payment: &Payment) {}
}

/// Hooks that do nothing.
pub struct NoopHooks;

#[async_trait]
impl PaymentHooks for NoopHooks {}

/// Applies received funds to payments.
pub struct Settler {
    /// How long a settled payment admits the visitor. `None` = forever.
    pub allowed_duration_ms: Option<i64>,
}

impl Settler {
    pub fn new(allowed_duration_ms: Option<i64>) -> Self {
        Self { allowed_duration_ms }
    }

    /// Persist a payment whose `amount_received` was just updated.
    ///
    /// Returns `true` when the payment settled. The payment is
    /// mutated in place to reflect what was stored.
    pub async fn save_visitor_payment(
        &self,
        payments: &dyn PaymentStore,
        visitors: &dyn VisitorStore,
        payment: &mut Payment,
        hooks: &dyn PaymentHooks,
        now: Timestamp,
    ) -> Result<bool> {
        payment.updated = Some(now);

        if payment.is_paid() {
            payment.status = PaymentStatus::Settled;

            let mut visitor = visitors
                .get_by_id(payment.visitor_id)?
                .ok_or(StoreError::VisitorNotFound(payment.visitor_id))?;
            let until = match self.allowed_duration_ms {
                Some(ms) => StatusUntil::After(ms),
                None => StatusUntil::Never,
            };
            visitor.set_status(VisitorStatus::Allowed, Some("paid"), until, now);

            payments.save_settlement(payment, &visitor)?;
            tracing::info!(
                payment_id = payment.id,
                visitor_id = payment.visitor_id,
                amount_received = payment.amount_received,
                "payment settled, visitor allowed"
            );
            hooks.payment_settled(payment, &visitor).await;
            return Ok(true);
        }

        payments.update(payment)?;
        if payment.amount_received > 0 {
            tracing::debug!(
                payment_id = payment.id,
                amount_received = payment.amount_received,
                amount_owed = payment.amount_owed,
                "partial payment recorded"
            );
            hooks.payment_partial(payment).await;
        }
        Ok(false)
    }

    /// Lapse every overdue PENDING payment. Returns how many expired.
    pub fn expire_payments(&self, payments: &dyn PaymentStore, now: Timestamp) -> Result<usize> {
        let expired = payments.expire_pending(now)?;
        if expired > 0 {
            tracing::info!(expired, "expired overdue payments");
        }
        Ok(expired)
    }
}
