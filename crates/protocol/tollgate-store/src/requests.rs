//! Request storage.

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use tollgate_types::Request;

use crate::error::{Result, StoreError};
use crate::traits::RequestStore;

/// SQLite-based request store.
pub struct SqliteRequestStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRequestStore {
    /// Create a new request store with the given database connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Deserialize a request from a database row.
    fn deserialize_request(row: &rusqlite::Row) -> rusqlite::Result<Request> {
        let query_json: String = row.get(6)?;
        let query = serde_json::from_str(&query_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let headers_json: String = row.get(7)?;
        let headers = serde_json::from_str(&headers_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Request {
            id: Some(row.get(0)?),
            visitor_id: row.get(1)?,
            method: row.get(2)?,
            protocol: row.get(3)?,
            hostname: row.get(4)?,
            path: row.get(5)?,
            query,
            headers,
            created: row.get(8)?,
            requested: row.get(9)?,
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, visitor_id, method, protocol, hostname, path, query, headers, created, requested";

impl RequestStore for SqliteRequestStore {
    fn append(&self, request: &Request) -> Result<Request> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;

        let query_json = serde_json::to_string(&request.query)?;
        let headers_json = serde_json::to_string(&request.headers)?;
        conn.execute(
            "INSERT INTO request
                (visitor_id, method, protocol, hostname, path, query, headers, created, requested)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                request.visitor_id,
                request.method,
                request.protocol,
                request.hostname,
                request.path,
                query_json,
                headers_json,
                request.created,
                request.requested,
            ],
        )?;

        let mut saved = request.clone();
        saved.id = Some(conn.last_insert_rowid());
        Ok(saved)
    }

    fn newest(&self, visitor_id: i64, limit: u32) -> Result<Vec<Request>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM request
             WHERE visitor_id = ?1
             ORDER BY requested DESC, id DESC
             LIMIT ?2"
        ))?;

        let requests = stmt
            .query_map(params![visitor_id, limit], Self::deserialize_request)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(requests)
    }

    fn earliest(&self, visitor_id: i64) -> Result<Option<Request>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;

        let request = conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM request
                     WHERE visitor_id = ?1
                     ORDER BY requested ASC, id ASC
                     LIMIT 1"
                ),
                [visitor_id],
                Self::deserialize_request,
            )
            .optional()?;
        Ok(request)
    }

    fn count(&self, visitor_id: i64) -> Result<u64> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM request WHERE visitor_id = ?1",
            [visitor_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
