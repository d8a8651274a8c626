//! Structured gate events.
//!
//! The engine reports what it does through an explicit sink trait.
//! Emitting is strictly fire-and-forget: a sink can log, count or
//! forward events, but nothing it does feeds back into gate behavior.

use async_trait::async_trait;

use tollgate_pay::{CheckOutcome, PaymentHooks};
use tollgate_types::{Payment, Visitor};

/// Something the gate did.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum GateEvent {
    /// A detection run started for the visitor.
    DetectStart { ip: String },
    /// A detection run finished. `passed` is the last decisive
    /// verdict, `None` when every detector was inconclusive.
    DetectEnd {
        ip: String,
        passed: Option<bool>,
        decided_by: Option<String>,
    },
    /// A payment demand reached its owed amount; the visitor is
    /// allowed.
    PaymentSettled {
        payment_id: Option<i64>,
        visitor_ip: String,
        amount_received: i64,
    },
    /// A payment demand received funds below its owed amount.
    PaymentPartial {
        payment_id: Option<i64>,
        amount_received: i64,
        amount_owed: i64,
    },
    /// A reconciliation run started.
    CheckPaymentsStart,
    /// A reconciliation run finished.
    CheckPaymentsEnd {
        total: u64,
        settled: u64,
        expired: u64,
        errors: usize,
    },
    /// A prune run started.
    PruneStart,
    /// A prune run finished.
    PruneEnd { removed: usize },
}

/// Receives gate events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: GateEvent);
}

/// Sink that drops everything.
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn emit(&self, _event: GateEvent) {}
}

/// Adapts an [`EventSink`] to the payment layer's hook seam, so
/// settlement transitions surface as gate events.
pub struct SinkHooks<'a> {
    sink: &'a dyn EventSink,
}

impl<'a> SinkHooks<'a> {
    pub fn new(sink: &'a dyn EventSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl PaymentHooks for SinkHooks<'_> {
    async fn check_started(&self) {
        self.sink.emit(GateEvent::CheckPaymentsStart).await;
    }

    async fn payment_settled(&self, payment: &Payment, visitor: &Visitor) {
        self.sink
            .emit(GateEvent::PaymentSettled {
                payment_id: payment.id,
                visitor_ip: visitor.ip.clone(),
                amount_received: payment.amount_received,
            })
            .await;
    }

    async fn payment_partial(&self, payment: &Payment) {
        self.sink
            .emit(GateEvent::PaymentPartial {
                payment_id: payment.id,
                amount_received: payment.amount_received,
                amount_owed: payment.amount_owed,
            })
            .await;
    }
}

/// Convenience emitter for check-payment outcomes.
pub(crate) async fn emit_check_end(sink: &dyn EventSink, outcome: &CheckOutcome) {
    sink.emit(GateEvent::CheckPaymentsEnd {
        total: outcome.total,
        settled: outcome.settled,
        expired: outcome.expired,
        errors: outcome.errors.len(),
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    pub(crate) struct RecordingSink {
        pub events: Mutex<Vec<GateEvent>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn emit(&self, event: GateEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn test_hooks_forward_settlement_as_events() {
        let sink = RecordingSink::new();
        let hooks = SinkHooks::new(&sink);

        let visitor = Visitor::new("203.0.113.7", 0).unwrap();
        let mut payment = Payment {
            id: Some(1),
            visitor_id: 1,
            status: tollgate_types::PaymentStatus::Pending,
            method: tollgate_types::PaymentMethod::Bitcoin,
            network: tollgate_types::Network::Livenet,
            address: "1abc".to_string(),
            address_scheme: tollgate_types::AddressScheme::HdPubkey,
            xpub: "xpub".to_string(),
            derive_index: 0,
            amount_owed: 5_000_000,
            amount_received: 5_000_000,
            detail: serde_json::json!({}),
            created: 0,
            updated: None,
            expires: None,
        };

        hooks.check_started().await;
        hooks.payment_settled(&payment, &visitor).await;
        payment.amount_received = 100;
        hooks.payment_partial(&payment).await;

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], GateEvent::CheckPaymentsStart));
        assert!(matches!(
            events[1],
            GateEvent::PaymentSettled {
                amount_received: 5_000_000,
                ..
            }
        ));
        assert!(matches!(
            events[2],
            GateEvent::PaymentPartial {
                amount_received: 100,
                ..
            }
        ));
    }
}
