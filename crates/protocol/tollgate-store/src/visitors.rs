//! Visitor storage.

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use tollgate_types::{Timestamp, Visitor, VisitorStatus};

use crate::error::{Result, StoreError};
use crate::traits::VisitorStore;

/// SQLite-based visitor store.
pub struct SqliteVisitorStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVisitorStore {
    /// Create a new visitor store with the given database connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Deserialize a visitor from a database row.
    pub(crate) fn deserialize_visitor(row: &rusqlite::Row) -> rusqlite::Result<Visitor> {
        let status_code: Option<i64> = row.get(4)?;
        let status = status_code
            .map(VisitorStatus::from_code)
            .transpose()
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Integer,
                    Box::new(e),
                )
            })?;

        Ok(Visitor {
            id: Some(row.get(0)?),
            ip: row.get(1)?,
            ip_version: row.get(2)?,
            hostname: row.get(3)?,
            status,
            status_reason: row.get(5)?,
            status_set: row.get(6)?,
            status_expires: row.get(7)?,
            created: row.get(8)?,
            hostname_looked_up: false,
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, ip, ip_version, hostname, status_id, status_reason, status_set, status_expires, created";

impl VisitorStore for SqliteVisitorStore {
    fn insert(&self, visitor: &Visitor) -> Result<Visitor> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;

        conn.execute(
            "INSERT INTO visitor
                (ip, ip_version, hostname, status_id, status_reason, status_set, status_expires, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                visitor.ip,
                visitor.ip_version,
                visitor.hostname,
                visitor.status.map(|s| s.code()),
                visitor.status_reason,
                visitor.status_set,
                visitor.status_expires,
                visitor.created,
            ],
        )?;

        let mut saved = visitor.clone();
        saved.id = Some(conn.last_insert_rowid());
        Ok(saved)
    }

    fn update(&self, visitor: &Visitor) -> Result<()> {
        let id = visitor.id.ok_or(StoreError::Unsaved("visitor"))?;
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;

        let changed = conn.execute(
            "UPDATE visitor SET
                hostname = ?2, status_id = ?3, status_reason = ?4,
                status_set = ?5, status_expires = ?6
             WHERE id = ?1",
            params![
                id,
                visitor.hostname,
                visitor.status.map(|s| s.code()),
                visitor.status_reason,
                visitor.status_set,
                visitor.status_expires,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::VisitorNotFound(id));
        }
        Ok(())
    }

    fn get_by_ip(&self, ip: &str) -> Result<Option<Visitor>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;

        let visitor = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM visitor WHERE ip = ?1"),
                [ip],
                Self::deserialize_visitor,
            )
            .optional()?;
        Ok(visitor)
    }

    fn get_by_id(&self, id: i64) -> Result<Option<Visitor>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;

        let visitor = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM visitor WHERE id = ?1"),
                [id],
                Self::deserialize_visitor,
            )
            .optional()?;
        Ok(visitor)
    }

    fn delete_unknown_older_than(&self, cutoff: Timestamp) -> Result<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;

        let removed = conn.execute(
            "DELETE FROM visitor WHERE status_id IS NULL AND created < ?1",
            [cutoff],
        )?;
        Ok(removed)
    }
}
