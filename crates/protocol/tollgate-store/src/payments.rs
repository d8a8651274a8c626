//! Payment storage, including the transactional allocator operations.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::sync::{Arc, Mutex};

use tollgate_types::{
    AddressScheme, Network, Payment, PaymentMethod, PaymentStatus, Timestamp, Visitor,
};

use crate::error::{Result, StoreError};
use crate::traits::{DeriveAddress, NewPayment, PaymentStore};

/// SQLite-based payment store.
pub struct SqlitePaymentStore {
    conn: Arc<Mutex<Connection>>,
}

const SELECT_COLUMNS: &str = "id, visitor_id, status_id, method_id, network_id, address, \
     address_scheme_id, xpub, derive_index, amount_owed, amount_received, detail, \
     created, updated, expires";

impl SqlitePaymentStore {
    /// Create a new payment store with the given database connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Deserialize a payment from a database row.
    fn deserialize_payment(row: &rusqlite::Row) -> rusqlite::Result<Payment> {
        fn conv<T>(
            idx: usize,
            r: std::result::Result<T, tollgate_types::TypesError>,
        ) -> rusqlite::Result<T> {
            r.map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Integer,
                    Box::new(e),
                )
            })
        }

        let detail_json: String = row.get(11)?;
        let detail = serde_json::from_str(&detail_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Payment {
            id: Some(row.get(0)?),
            visitor_id: row.get(1)?,
            status: conv(2, PaymentStatus::from_code(row.get(2)?))?,
            method: conv(3, PaymentMethod::from_code(row.get(3)?))?,
            network: conv(4, Network::from_code(row.get(4)?))?,
            address: row.get(5)?,
            address_scheme: conv(6, AddressScheme::from_code(row.get(6)?))?,
            xpub: row.get(7)?,
            derive_index: row.get(8)?,
            amount_owed: row.get(9)?,
            amount_received: row.get(10)?,
            detail,
            created: row.get(12)?,
            updated: row.get(13)?,
            expires: row.get(14)?,
        })
    }

    /// PENDING lookup that can run inside a transaction.
    fn find_pending_on(
        conn: &Connection,
        visitor_id: i64,
        method: PaymentMethod,
        network: Network,
    ) -> Result<Option<Payment>> {
        let payment = conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM payment
                     WHERE visitor_id = ?1 AND method_id = ?2 AND network_id = ?3
                       AND status_id = ?4
                     ORDER BY created DESC, id DESC
                     LIMIT 1"
                ),
                params![
                    visitor_id,
                    method.code(),
                    network.code(),
                    PaymentStatus::Pending.code()
                ],
                Self::deserialize_payment,
            )
            .optional()?;
        Ok(payment)
    }

    /// Repurpose the oldest EXPIRED row for a new visitor, keeping its
    /// address, derivation coordinates and `created`.
    fn reuse_expired_on(
        conn: &Connection,
        spec: &NewPayment,
        now: Timestamp,
    ) -> Result<Option<Payment>> {
        let expired = conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM payment
                     WHERE method_id = ?1 AND network_id = ?2 AND status_id = ?3
                     ORDER BY created ASC, id ASC
                     LIMIT 1"
                ),
                params![
                    spec.method.code(),
                    spec.network.code(),
                    PaymentStatus::Expired.code()
                ],
                Self::deserialize_payment,
            )
            .optional()?;

        let Some(mut payment) = expired else {
            return Ok(None);
        };

        conn.execute(
            "UPDATE payment SET
                visitor_id = ?2, status_id = ?3, amount_owed = ?4, amount_received = 0,
                detail = '{}', updated = ?5, expires = ?6
             WHERE id = ?1",
            params![
                payment.id,
                spec.visitor_id,
                PaymentStatus::Pending.code(),
                spec.amount_owed,
                now,
                spec.expires,
            ],
        )?;

        payment.visitor_id = spec.visitor_id;
        payment.status = PaymentStatus::Pending;
        payment.amount_owed = spec.amount_owed;
        payment.amount_received = 0;
        payment.detail = serde_json::json!({});
        payment.updated = Some(now);
        payment.expires = spec.expires;
        Ok(Some(payment))
    }

    /// Derive and insert a fresh payment row, advancing the index past
    /// address collisions.
    fn create_derived_on(
        conn: &Connection,
        spec: &NewPayment,
        max_attempts: u32,
        derive: DeriveAddress,
        now: Timestamp,
    ) -> Result<Payment> {
        let last_index: Option<u32> = conn.query_row(
            "SELECT MAX(derive_index) FROM payment
             WHERE method_id = ?1 AND address_scheme_id = ?2 AND xpub = ?3 AND network_id = ?4",
            params![
                spec.method.code(),
                spec.address_scheme.code(),
                spec.xpub,
                spec.network.code()
            ],
            |row| row.get(0),
        )?;
        let mut index = match last_index {
            Some(last) => last + 1,
            None => spec.derive_index_start,
        };

        for _ in 0..max_attempts {
            let address = derive(index).map_err(StoreError::derivation)?;
            if address.is_empty() {
                return Err(StoreError::derivation("derived an empty address"));
            }

            let inserted = conn.execute(
                "INSERT INTO payment
                    (visitor_id, status_id, method_id, network_id, address,
                     address_scheme_id, xpub, derive_index, amount_owed, amount_received,
                     detail, created, updated, expires)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, '{}', ?10, NULL, ?11)",
                params![
                    spec.visitor_id,
                    PaymentStatus::Pending.code(),
                    spec.method.code(),
                    spec.network.code(),
                    address,
                    spec.address_scheme.code(),
                    spec.xpub,
                    index,
                    spec.amount_owed,
                    now,
                    spec.expires,
                ],
            );

            match inserted {
                Ok(_) => {
                    return Ok(Payment {
                        id: Some(conn.last_insert_rowid()),
                        visitor_id: spec.visitor_id,
                        status: PaymentStatus::Pending,
                        method: spec.method,
                        network: spec.network,
                        address,
                        address_scheme: spec.address_scheme,
                        xpub: spec.xpub.clone(),
                        derive_index: index,
                        amount_owed: spec.amount_owed,
                        amount_received: 0,
                        detail: serde_json::json!({}),
                        created: now,
                        updated: None,
                        expires: spec.expires,
                    });
                }
                Err(e) => {
                    let err: StoreError = e.into();
                    if err.is_unique_violation() {
                        tracing::warn!(
                            index,
                            "derived address already allocated, advancing index"
                        );
                        index += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }

        Err(StoreError::AddressCollision {
            attempts: max_attempts,
        })
    }
}

impl PaymentStore for SqlitePaymentStore {
    fn get_by_id(&self, id: i64) -> Result<Option<Payment>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;

        let payment = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM payment WHERE id = ?1"),
                [id],
                Self::deserialize_payment,
            )
            .optional()?;
        Ok(payment)
    }

    fn update(&self, payment: &Payment) -> Result<()> {
        let id = payment.id.ok_or(StoreError::Unsaved("payment"))?;
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;

        let detail_json = serde_json::to_string(&payment.detail)?;
        let changed = conn.execute(
            "UPDATE payment SET
                visitor_id = ?2, status_id = ?3, amount_owed = ?4, amount_received = ?5,
                detail = ?6, updated = ?7, expires = ?8
             WHERE id = ?1",
            params![
                id,
                payment.visitor_id,
                payment.status.code(),
                payment.amount_owed,
                payment.amount_received,
                detail_json,
                payment.updated,
                payment.expires,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::PaymentNotFound(id));
        }
        Ok(())
    }

    fn find_pending(
        &self,
        visitor_id: i64,
        method: PaymentMethod,
        network: Network,
    ) -> Result<Option<Payment>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;
        Self::find_pending_on(&conn, visitor_id, method, network)
    }

    fn get_or_create_pending(
        &self,
        spec: &NewPayment,
        reuse_expired: bool,
        max_attempts: u32,
        derive: DeriveAddress,
        now: Timestamp,
    ) -> Result<Payment> {
        if spec.amount_owed <= 0 {
            return Err(StoreError::invalid_data("amount_owed must be positive"));
        }

        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let payment = if let Some(existing) =
            Self::find_pending_on(&tx, spec.visitor_id, spec.method, spec.network)?
        {
            existing
        } else if let Some(reused) = reuse_expired
            .then(|| Self::reuse_expired_on(&tx, spec, now))
            .transpose()?
            .flatten()
        {
            tracing::debug!(
                payment_id = reused.id,
                address = %reused.address,
                "repurposed expired payment row"
            );
            reused
        } else {
            Self::create_derived_on(&tx, spec, max_attempts, derive, now)?
        };

        tx.commit()?;
        Ok(payment)
    }

    fn save_settlement(&self, payment: &Payment, visitor: &Visitor) -> Result<()> {
        let payment_id = payment.id.ok_or(StoreError::Unsaved("payment"))?;
        let visitor_id = visitor.id.ok_or(StoreError::Unsaved("visitor"))?;

        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let detail_json = serde_json::to_string(&payment.detail)?;
        let changed = tx.execute(
            "UPDATE payment SET
                status_id = ?2, amount_received = ?3, detail = ?4, updated = ?5
             WHERE id = ?1",
            params![
                payment_id,
                payment.status.code(),
                payment.amount_received,
                detail_json,
                payment.updated,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::PaymentNotFound(payment_id));
        }

        let changed = tx.execute(
            "UPDATE visitor SET
                hostname = ?2, status_id = ?3, status_reason = ?4,
                status_set = ?5, status_expires = ?6
             WHERE id = ?1",
            params![
                visitor_id,
                visitor.hostname,
                visitor.status.map(|s| s.code()),
                visitor.status_reason,
                visitor.status_set,
                visitor.status_expires,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::VisitorNotFound(visitor_id));
        }

        tx.commit()?;
        Ok(())
    }

    fn expire_pending(&self, now: Timestamp) -> Result<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;

        let changed = conn.execute(
            "UPDATE payment SET status_id = ?1, updated = ?2
             WHERE status_id = ?3 AND expires IS NOT NULL AND expires <= ?2",
            params![
                PaymentStatus::Expired.code(),
                now,
                PaymentStatus::Pending.code()
            ],
        )?;
        Ok(changed)
    }

    fn max_id(&self) -> Result<Option<i64>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;

        let max: Option<i64> = conn.query_row("SELECT MAX(id) FROM payment", [], |row| row.get(0))?;
        Ok(max)
    }

    fn count_pending_through(
        &self,
        max_id: i64,
        method: PaymentMethod,
        network: Network,
    ) -> Result<u64> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM payment
             WHERE status_id = ?1 AND method_id = ?2 AND network_id = ?3 AND id <= ?4",
            params![
                PaymentStatus::Pending.code(),
                method.code(),
                network.code(),
                max_id
            ],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn pending_batch(
        &self,
        max_id: i64,
        method: PaymentMethod,
        network: Network,
        before_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Payment>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM payment
             WHERE status_id = ?1 AND method_id = ?2 AND network_id = ?3
               AND id <= ?4 AND (?5 IS NULL OR id < ?5)
             ORDER BY id DESC
             LIMIT ?6"
        ))?;

        let payments = stmt
            .query_map(
                params![
                    PaymentStatus::Pending.code(),
                    method.code(),
                    network.code(),
                    max_id,
                    before_id,
                    limit
                ],
                Self::deserialize_payment,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::initialize_schema;
    use crate::traits::VisitorStore;
    use crate::visitors::SqliteVisitorStore;
    use tollgate_types::{StatusUntil, Visitor, VisitorStatus};

    const NOW: Timestamp = 1_700_000_000_000;

    struct Fixture {
        visitors: SqliteVisitorStore,
        payments: SqlitePaymentStore,
    }

    fn setup() -> Fixture {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        initialize_schema(&conn.lock().unwrap()).unwrap();
        Fixture {
            visitors: SqliteVisitorStore::new(conn.clone()),
            payments: SqlitePaymentStore::new(conn),
        }
    }

    fn visitor(f: &Fixture, ip: &str) -> i64 {
        f.visitors
            .insert(&Visitor::new(ip, NOW).unwrap())
            .unwrap()
            .id
            .unwrap()
    }

    fn spec(visitor_id: i64) -> NewPayment {
        NewPayment {
            visitor_id,
            method: PaymentMethod::Bitcoin,
            network: Network::Testnet,
            address_scheme: AddressScheme::HdPubkey,
            xpub: "tpubTEST".to_string(),
            amount_owed: 5_000_000,
            expires: Some(NOW + 86_400_000),
            derive_index_start: 0,
        }
    }

    fn numbered_address(index: u32) -> std::result::Result<String, String> {
        Ok(format!("addr-{index}"))
    }

    #[test]
    fn test_create_derives_at_start_index() {
        let f = setup();
        let vid = visitor(&f, "203.0.113.7");

        let p = f
            .payments
            .get_or_create_pending(&spec(vid), true, 3, &numbered_address, NOW)
            .unwrap();
        assert_eq!(p.derive_index, 0);
        assert_eq!(p.address, "addr-0");
        assert_eq!(p.status, PaymentStatus::Pending);
        assert_eq!(p.amount_owed, 5_000_000);
    }

    #[test]
    fn test_existing_pending_wins() {
        let f = setup();
        let vid = visitor(&f, "203.0.113.7");

        let first = f
            .payments
            .get_or_create_pending(&spec(vid), true, 3, &numbered_address, NOW)
            .unwrap();
        let second = f
            .payments
            .get_or_create_pending(&spec(vid), true, 3, &numbered_address, NOW + 10)
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.address, "addr-0");
    }

    #[test]
    fn test_index_advances_across_visitors() {
        let f = setup();
        let a = visitor(&f, "203.0.113.1");
        let b = visitor(&f, "203.0.113.2");

        let pa = f
            .payments
            .get_or_create_pending(&spec(a), false, 3, &numbered_address, NOW)
            .unwrap();
        let pb = f
            .payments
            .get_or_create_pending(&spec(b), false, 3, &numbered_address, NOW)
            .unwrap();
        assert_eq!(pa.derive_index, 0);
        assert_eq!(pb.derive_index, 1);
    }

    #[test]
    fn test_collision_retry_advances_index() {
        let f = setup();
        let a = visitor(&f, "203.0.113.1");
        let b = visitor(&f, "203.0.113.2");

        f.payments
            .get_or_create_pending(&spec(a), false, 3, &numbered_address, NOW)
            .unwrap();

        // a derive function that ignores its index and keeps handing
        // out the taken address until the third call
        let collide = |index: u32| -> std::result::Result<String, String> {
            if index < 3 {
                Ok("addr-0".to_string())
            } else {
                Ok("addr-fresh".to_string())
            }
        };
        // start from index 1 (max is 0), collide twice, succeed at 3rd attempt
        let p = f
            .payments
            .get_or_create_pending(&spec(b), false, 3, &collide, NOW)
            .unwrap();
        assert_eq!(p.address, "addr-fresh");
        assert_eq!(p.derive_index, 3);
    }

    #[test]
    fn test_collision_retry_is_bounded() {
        let f = setup();
        let a = visitor(&f, "203.0.113.1");
        let b = visitor(&f, "203.0.113.2");

        f.payments
            .get_or_create_pending(&spec(a), false, 3, &numbered_address, NOW)
            .unwrap();

        let always_taken = |_: u32| -> std::result::Result<String, String> {
            Ok("addr-0".to_string())
        };
        let err = f
            .payments
            .get_or_create_pending(&spec(b), false, 3, &always_taken, NOW)
            .unwrap_err();
        assert!(matches!(err, StoreError::AddressCollision { attempts: 3 }));
    }

    #[test]
    fn test_reuse_expired_repurposes_row() {
        let f = setup();
        let a = visitor(&f, "203.0.113.1");
        let b = visitor(&f, "203.0.113.2");

        let mut p = f
            .payments
            .get_or_create_pending(&spec(a), true, 3, &numbered_address, NOW)
            .unwrap();
        p.status = PaymentStatus::Expired;
        p.updated = Some(NOW);
        f.payments.update(&p).unwrap();

        let reused = f
            .payments
            .get_or_create_pending(&spec(b), true, 3, &numbered_address, NOW + 100)
            .unwrap();
        assert_eq!(reused.id, p.id, "row is repurposed, not recreated");
        assert_eq!(reused.address, p.address);
        assert_eq!(reused.derive_index, p.derive_index);
        assert_eq!(reused.created, p.created, "created is kept");
        assert_eq!(reused.visitor_id, b);
        assert_eq!(reused.status, PaymentStatus::Pending);
        assert_eq!(reused.amount_received, 0);
    }

    #[test]
    fn test_reuse_disabled_derives_fresh() {
        let f = setup();
        let a = visitor(&f, "203.0.113.1");
        let b = visitor(&f, "203.0.113.2");

        let mut p = f
            .payments
            .get_or_create_pending(&spec(a), false, 3, &numbered_address, NOW)
            .unwrap();
        p.status = PaymentStatus::Expired;
        f.payments.update(&p).unwrap();

        let fresh = f
            .payments
            .get_or_create_pending(&spec(b), false, 3, &numbered_address, NOW)
            .unwrap();
        assert_ne!(fresh.id, p.id);
        assert_eq!(fresh.derive_index, 1);
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let f = setup();
        let vid = visitor(&f, "203.0.113.7");
        let mut s = spec(vid);
        s.amount_owed = 0;
        assert!(f
            .payments
            .get_or_create_pending(&s, false, 3, &numbered_address, NOW)
            .is_err());
    }

    #[test]
    fn test_save_settlement_updates_both_rows() {
        let f = setup();
        let vid = visitor(&f, "203.0.113.7");
        let mut p = f
            .payments
            .get_or_create_pending(&spec(vid), false, 3, &numbered_address, NOW)
            .unwrap();

        p.amount_received = p.amount_owed;
        p.status = PaymentStatus::Settled;
        p.updated = Some(NOW + 50);

        let mut v = f.visitors.get_by_id(vid).unwrap().unwrap();
        v.set_status(
            VisitorStatus::Allowed,
            Some("paid"),
            StatusUntil::After(1000),
            NOW + 50,
        );

        f.payments.save_settlement(&p, &v).unwrap();

        let p2 = f.payments.get_by_id(p.id.unwrap()).unwrap().unwrap();
        assert_eq!(p2.status, PaymentStatus::Settled);
        assert_eq!(p2.amount_received, p.amount_owed);

        let v2 = f.visitors.get_by_id(vid).unwrap().unwrap();
        assert_eq!(v2.status, Some(VisitorStatus::Allowed));
        assert_eq!(v2.status_reason.as_deref(), Some("paid"));
    }

    #[test]
    fn test_save_settlement_missing_visitor_rolls_back() {
        let f = setup();
        let vid = visitor(&f, "203.0.113.7");
        let mut p = f
            .payments
            .get_or_create_pending(&spec(vid), false, 3, &numbered_address, NOW)
            .unwrap();
        p.status = PaymentStatus::Settled;
        p.amount_received = p.amount_owed;

        let mut ghost = Visitor::new("203.0.113.99", NOW).unwrap();
        ghost.id = Some(9999);

        assert!(f.payments.save_settlement(&p, &ghost).is_err());

        // the payment update was rolled back with it
        let p2 = f.payments.get_by_id(p.id.unwrap()).unwrap().unwrap();
        assert_eq!(p2.status, PaymentStatus::Pending);
    }

    #[test]
    fn test_expire_pending_bulk() {
        let f = setup();
        let a = visitor(&f, "203.0.113.1");
        let b = visitor(&f, "203.0.113.2");
        let c = visitor(&f, "203.0.113.3");

        // expires in the past
        let mut s = spec(a);
        s.expires = Some(NOW - 1);
        f.payments
            .get_or_create_pending(&s, false, 3, &numbered_address, NOW - 100)
            .unwrap();

        // expires in the future
        let mut s = spec(b);
        s.expires = Some(NOW + 1000);
        f.payments
            .get_or_create_pending(&s, false, 3, &numbered_address, NOW)
            .unwrap();

        // never expires
        let mut s = spec(c);
        s.expires = None;
        f.payments
            .get_or_create_pending(&s, false, 3, &numbered_address, NOW)
            .unwrap();

        let changed = f.payments.expire_pending(NOW).unwrap();
        assert_eq!(changed, 1);

        let batch = f
            .payments
            .pending_batch(
                f.payments.max_id().unwrap().unwrap(),
                PaymentMethod::Bitcoin,
                Network::Testnet,
                None,
                10,
            )
            .unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_pending_batch_pages_by_cursor() {
        let f = setup();
        for i in 0..5 {
            let vid = visitor(&f, &format!("203.0.113.{}", i + 1));
            f.payments
                .get_or_create_pending(&spec(vid), false, 3, &numbered_address, NOW)
                .unwrap();
        }
        let max_id = f.payments.max_id().unwrap().unwrap();
        assert_eq!(
            f.payments
                .count_pending_through(max_id, PaymentMethod::Bitcoin, Network::Testnet)
                .unwrap(),
            5
        );

        let page1 = f
            .payments
            .pending_batch(max_id, PaymentMethod::Bitcoin, Network::Testnet, None, 2)
            .unwrap();
        assert_eq!(page1.len(), 2);
        assert!(page1[0].id.unwrap() > page1[1].id.unwrap());

        let page2 = f
            .payments
            .pending_batch(
                max_id,
                PaymentMethod::Bitcoin,
                Network::Testnet,
                page1.last().and_then(|p| p.id),
                2,
            )
            .unwrap();
        assert_eq!(page2.len(), 2);
        assert!(page2[0].id.unwrap() < page1[1].id.unwrap());
    }
}
