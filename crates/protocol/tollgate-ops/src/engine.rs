//! The gate engine.
//!
//! `Gate` wires config, storage, the detector pipeline and the payment
//! machinery into the two calls an embedder makes per request:
//! `check` for the stored decision, `observe` to record the request
//! and (throttled) re-run detection. Detection happens after the
//! decision, so a request that earns a ban is still served; the ban
//! applies from the next request on.

use std::net::IpAddr;
use std::sync::Arc;

use tollgate_detect::detectors::{
    RateLimitDetector, UaBotDetector, UaImpostorDetector, UaSwitchingDetector, UaVersionDetector,
};
use tollgate_detect::{DnsResolver, Pipeline, PipelineEntry};
use tollgate_pay::{
    AllocatorConfig, BalanceSource, CheckOutcome, HdAddressDeriver, PaymentAllocator,
    PaymentChecker, Settler,
};
use tollgate_store::{
    GateState, JobLock, PaymentStore, RequestStore, StoreError, VisitorStore, META_PRUNE_STARTED,
};
use tollgate_types::{
    Payment, RequestSnapshot, Timestamp, TypesError, Visitor, VisitorStatus,
};

use crate::allowlist::is_whitelisted;
use crate::config::GateConfig;
use crate::error::{OpsError, Result};
use crate::event::{emit_check_end, EventSink, GateEvent, SinkHooks};

/// The gate's answer for one IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Serve the request. `status` is the stored status, if any.
    Allow { status: Option<VisitorStatus> },
    /// Bounce the request.
    Block {
        status: VisitorStatus,
        reason: Option<String>,
        expires_at: Option<Timestamp>,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// What one `observe` call did.
#[derive(Debug, Clone)]
pub struct ObserveOutcome {
    /// True when no detectors ran (whitelisted IP or throttled).
    pub aborted: bool,
    /// Last decisive pipeline verdict; `None` when aborted or when
    /// every detector came back inconclusive.
    pub passed: Option<bool>,
    /// The visitor as persisted; `None` for whitelisted IPs, which
    /// are never stored.
    pub visitor: Option<Visitor>,
}

impl ObserveOutcome {
    fn aborted(visitor: Option<Visitor>) -> Self {
        ObserveOutcome {
            aborted: true,
            passed: None,
            visitor,
        }
    }
}

/// What one prune run did.
#[derive(Debug, Clone, Default)]
pub struct PruneOutcome {
    /// Pruning is disabled or another run held the lock.
    pub aborted: bool,
    /// Visitors removed (their requests cascade).
    pub removed: usize,
}

/// The admission-control engine.
pub struct Gate {
    config: GateConfig,
    state: GateState,
    pipeline: Pipeline,
    dns: Arc<dyn DnsResolver>,
    allocator: Option<PaymentAllocator>,
    checker: Option<PaymentChecker>,
    settler: Settler,
}

fn build_pipeline(config: &GateConfig, dns: Arc<dyn DnsResolver>) -> Pipeline {
    let d = &config.detectors;
    let entries = vec![
        PipelineEntry {
            detector: Box::new(UaBotDetector {
                exclude: d.ua_bot.exclude.clone(),
                empty_is_bot: d.ua_bot.empty_is_bot,
                aggressive: d.ua_bot.aggressive,
            }),
            policy: d.ua_bot.policy,
        },
        PipelineEntry {
            detector: Box::new(UaVersionDetector {
                rules: d.ua_version.rules.clone(),
                ..UaVersionDetector::default()
            }),
            policy: d.ua_version.policy,
        },
        PipelineEntry {
            detector: Box::new(UaImpostorDetector::new(dns)),
            policy: d.ua_impostor.policy,
        },
        PipelineEntry {
            detector: Box::new(UaSwitchingDetector {
                min_requests: d.ua_switching.min_requests,
                max_requests: d.ua_switching.max_requests,
                timeframe_ms: d.ua_switching.timeframe_ms,
            }),
            policy: d.ua_switching.policy,
        },
        PipelineEntry {
            detector: Box::new(RateLimitDetector {
                rules: d.rate_limit.rules.clone(),
            }),
            policy: d.rate_limit.policy,
        },
    ];
    Pipeline::new(entries, config.allowed_duration_ms, config.ban_duration_ms)
}

impl Gate {
    /// Build a gate over an already-open store.
    pub fn new(config: GateConfig, state: GateState, dns: Arc<dyn DnsResolver>) -> Result<Self> {
        config.validate()?;

        let pipeline = build_pipeline(&config, dns.clone());
        let settler = Settler::new(config.payment.allowed_duration_ms);

        let (allocator, checker) = if config.payment.enabled {
            let pay = &config.payment;
            // validate() guarantees the xpub is present
            let xpub = pay
                .xpub
                .as_deref()
                .ok_or_else(|| OpsError::config("payment xpub missing"))?;
            let deriver = HdAddressDeriver::new(xpub, pay.network)?;
            let allocator = PaymentAllocator::new(
                deriver,
                AllocatorConfig {
                    method: pay.method,
                    network: pay.network,
                    amount_owed: pay.amount_owed,
                    expires_after_ms: pay.expires_after_ms,
                    reuse_expired: pay.reuse_expired,
                    derive_index_start: pay.derive_index_start,
                },
            );
            let checker = PaymentChecker::new(
                pay.method,
                pay.network,
                pay.min_confirmations,
                pay.check_timeout_ms,
            );
            (Some(allocator), Some(checker))
        } else {
            (None, None)
        };

        Ok(Gate {
            config,
            state,
            pipeline,
            dns,
            allocator,
            checker,
            settler,
        })
    }

    /// The configuration in force.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// The underlying storage.
    pub fn state(&self) -> &GateState {
        &self.state
    }

    fn parse_ip(&self, ip: &str) -> Result<IpAddr> {
        ip.parse()
            .map_err(|_| OpsError::Types(TypesError::validation(format!("invalid IP: {ip}"))))
    }

    /// The stored decision for an IP. Whitelisted ranges and unknown
    /// visitors are allowed; expired statuses read as unknown.
    pub fn check(&self, ip: &str, now: Timestamp) -> Result<Decision> {
        let addr = self.parse_ip(ip)?;
        if is_whitelisted(&self.config.whitelist, &addr) {
            return Ok(Decision::Allow { status: None });
        }

        let Some(visitor) = self.state.visitors.get_by_ip(ip)? else {
            return Ok(Decision::Allow { status: None });
        };

        match visitor.effective_status(now) {
            Some(status) if status.is_blocked() => Ok(Decision::Block {
                status,
                reason: visitor.status_reason.clone(),
                expires_at: visitor.status_expires,
            }),
            status => Ok(Decision::Allow { status }),
        }
    }

    /// Get-or-create the visitor row and append the request.
    fn save_visitor_request(
        &self,
        ip: &str,
        snapshot: &RequestSnapshot,
        now: Timestamp,
    ) -> Result<Visitor> {
        let visitor = match self.state.visitors.get_by_ip(ip)? {
            Some(v) => v,
            None => {
                let fresh = Visitor::new(ip, now)?;
                match self.state.visitors.insert(&fresh) {
                    Ok(v) => v,
                    // lost a race to another request from the same IP
                    Err(e) if e.is_unique_violation() => self
                        .state
                        .visitors
                        .get_by_ip(ip)?
                        .ok_or(StoreError::VisitorNotFound(0))?,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let visitor_id = visitor
            .id
            .ok_or_else(|| OpsError::config("visitor missing row id"))?;
        let request =
            snapshot
                .clone()
                .into_request(visitor_id, &self.config.retained_headers, now);
        self.state.requests.append(&request)?;
        Ok(visitor)
    }

    /// Whether detection should be skipped for this request.
    fn throttled(&self, visitor: &Visitor, newest: Timestamp, total: u64) -> Result<bool> {
        if self.config.detect_frequency_ms == 0 || total <= 1 {
            return Ok(false);
        }
        // measure from the last detection, or the first request seen
        // when the visitor has never been scored
        let prior = match visitor.status_set {
            Some(set) => set,
            None => match self.state.requests.earliest(visitor_id_of(visitor)?)? {
                Some(earliest) => earliest.requested,
                None => return Ok(false),
            },
        };
        Ok(newest < prior + self.config.detect_frequency_ms)
    }

    async fn fill_hostname(&self, visitor: &mut Visitor) {
        if !self.config.lookup_hostname || visitor.hostname_looked_up || visitor.hostname.is_some()
        {
            return;
        }
        visitor.hostname_looked_up = true;
        match self.dns.reverse(&visitor.ip).await {
            Ok(hostnames) => visitor.hostname = hostnames.into_iter().next(),
            Err(e) => {
                tracing::warn!(ip = %visitor.ip, error = %e, "reverse DNS lookup failed");
            }
        }
    }

    /// Record a request and, unless throttled, run detection.
    pub async fn observe(
        &self,
        ip: &str,
        snapshot: &RequestSnapshot,
        sink: &dyn EventSink,
        now: Timestamp,
    ) -> Result<ObserveOutcome> {
        let addr = self.parse_ip(ip)?;
        if is_whitelisted(&self.config.whitelist, &addr) {
            tracing::debug!(ip, "whitelisted, not recorded");
            return Ok(ObserveOutcome::aborted(None));
        }

        let mut visitor = self.save_visitor_request(ip, snapshot, now)?;
        let visitor_id = visitor_id_of(&visitor)?;
        let total = self.state.requests.count(visitor_id)?;

        let newest = self
            .state
            .requests
            .newest(visitor_id, self.config.request_depth() as u32)?;
        let newest_at = newest.first().map(|r| r.requested).unwrap_or(now);

        if self.throttled(&visitor, newest_at, total)? {
            tracing::debug!(ip, "detection throttled");
            return Ok(ObserveOutcome::aborted(Some(visitor)));
        }

        sink.emit(GateEvent::DetectStart { ip: ip.to_string() }).await;
        let outcome = self.pipeline.run(&mut visitor, &newest, total, now).await;

        self.fill_hostname(&mut visitor).await;
        self.state.visitors.update(&visitor)?;

        sink.emit(GateEvent::DetectEnd {
            ip: ip.to_string(),
            passed: outcome.passed,
            decided_by: outcome.decided_by.clone(),
        })
        .await;

        Ok(ObserveOutcome {
            aborted: false,
            passed: outcome.passed,
            visitor: Some(visitor),
        })
    }

    /// The stored decision, then (when allowed) ingestion + detection.
    ///
    /// Blocked visitors get their decision straight back: their
    /// requests are not recorded and detectors do not run for them.
    pub async fn evaluate(
        &self,
        ip: &str,
        snapshot: &RequestSnapshot,
        sink: &dyn EventSink,
        now: Timestamp,
    ) -> Result<Decision> {
        let decision = self.check(ip, now)?;
        if decision.is_allowed() {
            self.observe(ip, snapshot, sink, now).await?;
        }
        Ok(decision)
    }

    /// The visitor's open payment demand, creating one when `create`
    /// is set. `None` when payments are disabled or nothing exists.
    pub fn pending_payment(
        &self,
        visitor_id: i64,
        create: bool,
        now: Timestamp,
    ) -> Result<Option<Payment>> {
        let Some(allocator) = &self.allocator else {
            return Ok(None);
        };
        Ok(allocator.get_pending_payment(&self.state.payments, visitor_id, create, now)?)
    }

    /// Run one payment reconciliation pass.
    pub async fn run_payment_check(
        &self,
        source: &dyn BalanceSource,
        sink: &dyn EventSink,
        now: Timestamp,
    ) -> Result<CheckOutcome> {
        let Some(checker) = &self.checker else {
            return Ok(CheckOutcome {
                aborted: true,
                ..CheckOutcome::default()
            });
        };

        let hooks = SinkHooks::new(sink);
        let outcome = checker
            .run(
                &self.state.meta,
                &self.state.payments,
                &self.state.visitors,
                source,
                &self.settler,
                &hooks,
                now,
            )
            .await?;

        if !outcome.aborted {
            emit_check_end(sink, &outcome).await;
        }
        Ok(outcome)
    }

    /// Delete status-less visitors older than the configured cutoff,
    /// with their requests. Lock-guarded; optionally compacts the
    /// database afterwards.
    pub async fn prune(&self, sink: &dyn EventSink, now: Timestamp) -> Result<PruneOutcome> {
        let Some(older_than) = self.config.prune.older_than_ms else {
            return Ok(PruneOutcome {
                aborted: true,
                removed: 0,
            });
        };

        let lock = JobLock::new(&self.state.meta, META_PRUNE_STARTED, self.config.prune.timeout_ms);
        if !lock.try_acquire(now)? {
            return Ok(PruneOutcome {
                aborted: true,
                removed: 0,
            });
        }

        sink.emit(GateEvent::PruneStart).await;

        let result = self.state.visitors.delete_unknown_older_than(now - older_than);
        lock.release()?;
        let removed = result?;

        if removed > 0 {
            tracing::info!(removed, "pruned stale visitors");
            if self.config.prune.vacuum {
                self.state.vacuum()?;
            }
        }

        sink.emit(GateEvent::PruneEnd { removed }).await;
        Ok(PruneOutcome {
            aborted: false,
            removed,
        })
    }
}

fn visitor_id_of(visitor: &Visitor) -> Result<i64> {
    visitor
        .id
        .ok_or_else(|| OpsError::config("visitor missing row id"))
}
