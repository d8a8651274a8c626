//! Key/value metadata and the job lock primitive.
//!
//! Job locks are Meta rows holding the epoch-ms start time of the last
//! run. A lock whose timestamp is older than its timeout is treated as
//! abandoned and silently reclaimed, so a crashed job never wedges the
//! system for longer than the timeout.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::sync::{Arc, Mutex};

use tollgate_types::Timestamp;

use crate::error::{Result, StoreError};
use crate::traits::MetaStore;

/// Meta key guarding the visitor prune job.
pub const META_PRUNE_STARTED: &str = "prune_started";

/// Meta key prefix guarding payment reconciliation, one per method.
pub fn check_payments_key(method: &str) -> String {
    format!("check_payments_started_{method}")
}

/// SQLite-based meta store.
pub struct SqliteMetaStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetaStore {
    /// Create a new meta store with the given database connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_on(conn: &Connection, key: &str) -> Result<Option<String>> {
        let value: Option<Option<String>> = conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        // a missing row and a NULL value both read as None
        Ok(value.flatten())
    }
}

impl MetaStore for SqliteMetaStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;
        Self::get_on(&conn, key)
    }

    fn set(&self, key: &str, value: Option<&str>) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;

        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn get_and_set(
        &self,
        key: &str,
        transform: &mut dyn FnMut(Option<&str>) -> Option<Option<String>>,
    ) -> Result<Option<String>> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = Self::get_on(&tx, key)?;
        let outcome = transform(current.as_deref());

        let final_value = match outcome {
            Some(new_value) => {
                tx.execute(
                    "INSERT INTO meta (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, new_value],
                )?;
                new_value
            }
            None => current,
        };

        tx.commit()?;
        Ok(final_value)
    }
}

/// A reclaimable mutual-exclusion lock over a Meta row.
pub struct JobLock<'a> {
    meta: &'a dyn MetaStore,
    key: String,
    timeout_ms: i64,
}

impl<'a> JobLock<'a> {
    /// Create a lock handle for `key` with the given staleness timeout.
    pub fn new(meta: &'a dyn MetaStore, key: impl Into<String>, timeout_ms: i64) -> Self {
        Self {
            meta,
            key: key.into(),
            timeout_ms,
        }
    }

    /// Try to take the lock at time `now`.
    ///
    /// Succeeds when the row is absent, NULL, unparseable, or older
    /// than the timeout. Returns `false` when another holder is still
    /// live; that is an expected outcome, not an error.
    pub fn try_acquire(&self, now: Timestamp) -> Result<bool> {
        let mut acquired = false;
        self.meta.get_and_set(&self.key, &mut |current| {
            let held = current
                .and_then(|v| v.parse::<i64>().ok())
                .map(|started| started + self.timeout_ms >= now)
                .unwrap_or(false);
            if held {
                None
            } else {
                acquired = true;
                Some(Some(now.to_string()))
            }
        })?;

        if !acquired {
            tracing::debug!(key = %self.key, "job lock held, skipping");
        }
        Ok(acquired)
    }

    /// Release the lock by nulling the value.
    pub fn release(&self) -> Result<()> {
        self.meta.set(&self.key, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::initialize_schema;

    const NOW: Timestamp = 1_700_000_000_000;
    const TIMEOUT: i64 = 300_000;

    fn store() -> SqliteMetaStore {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        SqliteMetaStore::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_get_set_round_trip() {
        let meta = store();
        assert_eq!(meta.get("k").unwrap(), None);

        meta.set("k", Some("v")).unwrap();
        assert_eq!(meta.get("k").unwrap(), Some("v".to_string()));

        meta.set("k", None).unwrap();
        assert_eq!(meta.get("k").unwrap(), None, "NULL reads as absent");
    }

    #[test]
    fn test_get_and_set_writes_when_asked() {
        let meta = store();
        let out = meta
            .get_and_set("k", &mut |cur| {
                assert_eq!(cur, None);
                Some(Some("1".to_string()))
            })
            .unwrap();
        assert_eq!(out, Some("1".to_string()));
        assert_eq!(meta.get("k").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn test_get_and_set_skips_when_declined() {
        let meta = store();
        meta.set("k", Some("old")).unwrap();

        let out = meta.get_and_set("k", &mut |_| None).unwrap();
        assert_eq!(out, Some("old".to_string()));
        assert_eq!(meta.get("k").unwrap(), Some("old".to_string()));
    }

    #[test]
    fn test_lock_acquire_and_contention() {
        let meta = store();
        let lock = JobLock::new(&meta, META_PRUNE_STARTED, TIMEOUT);

        assert!(lock.try_acquire(NOW).unwrap());
        // a second holder inside the timeout window is refused
        assert!(!lock.try_acquire(NOW + 1).unwrap());
        assert!(!lock.try_acquire(NOW + TIMEOUT).unwrap());
    }

    #[test]
    fn test_lock_reclaims_stale_holder() {
        let meta = store();
        let lock = JobLock::new(&meta, META_PRUNE_STARTED, TIMEOUT);

        assert!(lock.try_acquire(NOW).unwrap());
        // just past the window the lock counts as abandoned
        assert!(lock.try_acquire(NOW + TIMEOUT + 1).unwrap());
    }

    #[test]
    fn test_lock_release_frees_immediately() {
        let meta = store();
        let lock = JobLock::new(&meta, "check_payments_started_bitcoin", TIMEOUT);

        assert!(lock.try_acquire(NOW).unwrap());
        lock.release().unwrap();
        assert!(lock.try_acquire(NOW + 1).unwrap());
    }

    #[test]
    fn test_lock_treats_garbage_value_as_free() {
        let meta = store();
        meta.set("prune_started", Some("not-a-number")).unwrap();

        let lock = JobLock::new(&meta, META_PRUNE_STARTED, TIMEOUT);
        assert!(lock.try_acquire(NOW).unwrap());
    }

    #[test]
    fn test_check_payments_key() {
        assert_eq!(
            check_payments_key("bitcoin"),
            "check_payments_started_bitcoin"
        );
    }
}
