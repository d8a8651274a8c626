//! SQLite persistence for the Tollgate admission-control engine.
//!
//! This crate provides storage for all gate state:
//!
//! - **Visitors** (SQLite): one row per IP, with the status machine fields
//! - **Requests** (SQLite): observed request history per visitor
//! - **Payments** (SQLite): payment demands and their lifecycle
//! - **Meta** (SQLite): key/value rows, including the job locks
//!
//! Everything lives in a single database file shared through one
//! `Arc<Mutex<Connection>>`; multi-row operations that must be atomic
//! (payment allocation, settlement, the lock primitive) run inside
//! SQLite transactions behind that mutex.
//!
//! # Trait-Based Design
//!
//! All storage components are defined as traits, allowing for
//! alternative implementations in tests. The default implementations
//! use SQLite.
//!
//! # Example
//!
//! ```
//! use tollgate_store::{GateState, VisitorStore};
//! use tollgate_types::Visitor;
//!
//! let state = GateState::open_in_memory().expect("open store");
//! let visitor = Visitor::new("203.0.113.7", 0).unwrap();
//! let saved = state.visitors.insert(&visitor).unwrap();
//! assert!(saved.id.is_some());
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod error;
pub mod meta;
pub mod payments;
pub mod requests;
pub mod schema;
pub mod traits;
pub mod visitors;

pub use error::{Result, StoreError};
pub use meta::{check_payments_key, JobLock, SqliteMetaStore, META_PRUNE_STARTED};
pub use payments::SqlitePaymentStore;
pub use requests::SqliteRequestStore;
pub use schema::{initialize_schema, SCHEMA_VERSION};
pub use traits::{
    DeriveAddress, MetaStore, NewPayment, PaymentStore, RequestStore, VisitorStore,
};
pub use visitors::SqliteVisitorStore;

/// All gate storage over one shared database connection.
pub struct GateState {
    /// Visitor rows.
    pub visitors: SqliteVisitorStore,
    /// Request history.
    pub requests: SqliteRequestStore,
    /// Payment demands.
    pub payments: SqlitePaymentStore,
    /// Key/value metadata and job locks.
    pub meta: SqliteMetaStore,

    conn: Arc<Mutex<Connection>>,
}

impl GateState {
    /// Open (or create) the database at `path` and initialize the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database. Intended for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::initialize_schema(&conn)?;
        let conn = Arc::new(Mutex::new(conn));

        Ok(GateState {
            visitors: SqliteVisitorStore::new(conn.clone()),
            requests: SqliteRequestStore::new(conn.clone()),
            payments: SqlitePaymentStore::new(conn.clone()),
            meta: SqliteMetaStore::new(conn.clone()),
            conn,
        })
    }

    /// The shared database connection.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    /// Reclaim file space after bulk deletions.
    pub fn vacuum(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;
        conn.execute_batch("VACUUM;")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_types::{RequestSnapshot, Visitor};

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let state = GateState::open(dir.path().join("gate.db"));
        assert!(state.is_ok());
    }

    #[test]
    fn test_open_in_memory() {
        let state = GateState::open_in_memory().unwrap();
        assert!(state.visitors.get_by_ip("203.0.113.7").unwrap().is_none());
    }

    #[test]
    fn test_stores_share_one_database() {
        let state = GateState::open_in_memory().unwrap();
        let visitor = state
            .visitors
            .insert(&Visitor::new("203.0.113.7", 0).unwrap())
            .unwrap();

        let req = RequestSnapshot::get("/", Some("ua")).into_request(
            visitor.id.unwrap(),
            &["user-agent".to_string()],
            0,
        );
        state.requests.append(&req).unwrap();
        assert_eq!(state.requests.count(visitor.id.unwrap()).unwrap(), 1);
    }

    #[test]
    fn test_reopen_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.db");

        {
            let state = GateState::open(&path).unwrap();
            state
                .visitors
                .insert(&Visitor::new("203.0.113.7", 0).unwrap())
                .unwrap();
        }

        let state = GateState::open(&path).unwrap();
        assert!(state.visitors.get_by_ip("203.0.113.7").unwrap().is_some());
    }

    #[test]
    fn test_vacuum() {
        let state = GateState::open_in_memory().unwrap();
        assert!(state.vacuum().is_ok());
    }
}
