//! Payment reconciliation.
//!
//! Walks every open payment demand, asks the balance source what each
//! address has received, settles what is paid and expires what is
//! overdue. Guarded by a reclaimable job lock so only one run per
//! method is live at a time.

use tollgate_store::{
    check_payments_key, JobLock, MetaStore, PaymentStore, VisitorStore,
};
use tollgate_types::{Network, Payment, PaymentMethod, Timestamp};

use crate::balance::BalanceSource;
use crate::error::Result;
use crate::settle::{PaymentHooks, Settler};

/// What one reconciliation run did.
#[derive(Debug, Default)]
pub struct CheckOutcome {
    /// Another run held the lock; nothing was checked.
    pub aborted: bool,
    /// Open demands in scope at the start of the run.
    pub total: u64,
    /// Demands settled by this run.
    pub settled: u64,
    /// Demands that lapsed after the scan.
    pub expired: u64,
    /// Failures encountered without stopping the run.
    pub errors: Vec<String>,
}

/// Reconciles pending payments against received funds.
pub struct PaymentChecker {
    method: PaymentMethod,
    network: Network,
    /// Confirmations a deposit needs before it counts.
    min_confirmations: u32,
    /// Staleness timeout for the reconciliation lock.
    lock_timeout_ms: i64,
}

impl PaymentChecker {
    pub fn new(
        method: PaymentMethod,
        network: Network,
        min_confirmations: u32,
        lock_timeout_ms: i64,
    ) -> Self {
        Self {
            method,
            network,
            min_confirmations,
            lock_timeout_ms,
        }
    }

    /// Run one reconciliation pass at time `now`.
    ///
    /// Rows are scanned id-descending below a max-id snapshot taken up
    /// front, so demands created mid-run are left for the next run.
    /// Balance and settlement failures are collected, never fatal; the
    /// lock is always released. Overdue demands are expired afterwards
    /// regardless of scan errors.
    pub async fn run(
        &self,
        meta: &dyn MetaStore,
        payments: &dyn PaymentStore,
        visitors: &dyn VisitorStore,
        source: &dyn BalanceSource,
        settler: &Settler,
        hooks: &dyn PaymentHooks,
        now: Timestamp,
    ) -> Result<CheckOutcome> {
        let lock = JobLock::new(
            meta,
            check_payments_key(self.method.as_str()),
            self.lock_timeout_ms,
        );
        if !lock.try_acquire(now)? {
            return Ok(CheckOutcome {
                aborted: true,
                ..CheckOutcome::default()
            });
        }
        hooks.check_started().await;

        let mut outcome = CheckOutcome::default();
        if let Some(max_id) = payments.max_id()? {
            outcome.total =
                payments.count_pending_through(max_id, self.method, self.network)?;
            self.scan(payments, visitors, source, settler, hooks, max_id, now, &mut outcome)
                .await;
        }

        lock.release()?;

        match settler.expire_payments(payments, now) {
            Ok(expired) => outcome.expired = expired as u64,
            Err(e) => outcome.errors.push(format!("expire: {e}")),
        }

        tracing::info!(
            method = self.method.as_str(),
            total = outcome.total,
            settled = outcome.settled,
            expired = outcome.expired,
            errors = outcome.errors.len(),
            "payment check finished"
        );
        Ok(outcome)
    }

    async fn scan(
        &self,
        payments: &dyn PaymentStore,
        visitors: &dyn VisitorStore,
        source: &dyn BalanceSource,
        settler: &Settler,
        hooks: &dyn PaymentHooks,
        max_id: i64,
        now: Timestamp,
        outcome: &mut CheckOutcome,
    ) {
        let batch_size = source.batch_size().max(1) as u32;
        let mut before_id: Option<i64> = None;

        loop {
            let batch = match payments.pending_batch(
                max_id,
                self.method,
                self.network,
                before_id,
                batch_size,
            ) {
                Ok(batch) => batch,
                Err(e) => {
                    outcome.errors.push(format!("batch fetch: {e}"));
                    return;
                }
            };
            let Some(last) = batch.last() else {
                return;
            };
            // settling removes rows from the pending set, so page by
            // id rather than offset
            before_id = last.id;

            let addresses: Vec<String> = batch.iter().map(|p| p.address.clone()).collect();
            let received = match source.received(&addresses, self.min_confirmations).await {
                Ok(received) => received,
                Err(e) => {
                    outcome.errors.push(format!("balance query: {e}"));
                    continue;
                }
            };

            for mut payment in batch {
                if let Err(e) = self
                    .apply(payments, visitors, settler, hooks, &received, &mut payment, now)
                    .await
                {
                    outcome
                        .errors
                        .push(format!("payment {}: {e}", payment.id.unwrap_or(-1)));
                } else if payment.status == tollgate_types::PaymentStatus::Settled {
                    outcome.settled += 1;
                }
            }
        }
    }

    async fn apply(
        &self,
        payments: &dyn PaymentStore,
        visitors: &dyn VisitorStore,
        settler: &Settler,
        hooks: &dyn PaymentHooks,
        received: &std::collections::HashMap<String, i64>,
        payment: &mut Payment,
        now: Timestamp,
    ) -> Result<()> {
        let funds = received.get(&payment.address).copied().unwrap_or(0);
        if funds == payment.amount_received {
            return Ok(());
        }

        payment.amount_received = funds;
        settler
            .save_visitor_payment(payments, visitors, payment, hooks, now)
            .await?;
        Ok(())
    }
}
