//! SQL schema initialization.

use rusqlite::Connection;

use crate::error::Result;

/// Schema version for migration tracking.
pub const SCHEMA_VERSION: u32 = 1;

/// Initialize the database schema.
///
/// Creates all tables and indexes if they don't exist.
/// This function is idempotent - calling it multiple times is safe.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // Enable WAL mode for better concurrent read/write performance
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    let current_version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    match current_version {
        None => {
            create_tables(conn)?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
        }
        Some(_) => {
            // No migrations yet; version 1 is current.
        }
    }

    Ok(())
}

/// Create all database tables.
fn create_tables(conn: &Connection) -> Result<()> {
    // Visitors, keyed by IP
    conn.execute(
        "CREATE TABLE IF NOT EXISTS visitor (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ip TEXT NOT NULL,
            ip_version INTEGER NOT NULL,
            hostname TEXT,
            status_id INTEGER,
            status_reason TEXT,
            status_set INTEGER,
            status_expires INTEGER,
            created INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_visitor_ip ON visitor(ip)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_visitor_status ON visitor(status_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_visitor_created ON visitor(created)",
        [],
    )?;

    // Observed requests
    conn.execute(
        "CREATE TABLE IF NOT EXISTS request (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            visitor_id INTEGER NOT NULL REFERENCES visitor(id) ON DELETE CASCADE,
            method TEXT NOT NULL,
            protocol TEXT NOT NULL,
            hostname TEXT NOT NULL,
            path TEXT NOT NULL,
            query TEXT NOT NULL DEFAULT '{}',
            headers TEXT NOT NULL,
            created INTEGER NOT NULL,
            requested INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_request_visitor ON request(visitor_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_request_requested ON request(requested)",
        [],
    )?;

    // Payment demands
    conn.execute(
        "CREATE TABLE IF NOT EXISTS payment (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            visitor_id INTEGER NOT NULL REFERENCES visitor(id),
            status_id INTEGER NOT NULL,
            method_id INTEGER NOT NULL,
            network_id INTEGER NOT NULL,
            address TEXT NOT NULL,
            address_scheme_id INTEGER NOT NULL,
            xpub TEXT NOT NULL,
            derive_index INTEGER NOT NULL,
            amount_owed INTEGER NOT NULL,
            amount_received INTEGER NOT NULL DEFAULT 0,
            detail TEXT NOT NULL DEFAULT '{}',
            created INTEGER NOT NULL,
            updated INTEGER,
            expires INTEGER
        )",
        [],
    )?;

    // One address can only ever back one payment row per method
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_payment_method_address
         ON payment(method_id, address)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payment_visitor ON payment(visitor_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payment_status ON payment(status_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payment_expires ON payment(expires)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payment_derivation
         ON payment(method_id, address_scheme_id, xpub, network_id, derive_index)",
        [],
    )?;

    // Key/value metadata (schema info, job locks)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT
        )",
        [],
    )?;

    Ok(())
}
