//! SQLite schema for the dedup store.
//!
//! This module defines the database schema and provides migration utilities
//! for the dedup database.

use rusqlite::{Connection, OptionalExtension};

use crate::{Error, Result};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
///
/// Creates all tables if they don't exist. A database written by a newer
/// binary is refused rather than silently misread.
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version > SCHEMA_VERSION {
        return Err(Error::StorageUnavailable(format!(
            "database schema version {} is newer than supported version {}",
            current_version, SCHEMA_VERSION
        )));
    }

    Ok(())
}

/// Get the current schema version (0 if not initialized).
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| unavailable("create schema_version", e))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| unavailable("read schema version", e))?;

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])
        .and_then(|_| conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version]))
        .map_err(|e| unavailable("write schema version", e))?;
    Ok(())
}

/// Create all tables for a fresh database.
fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per accepted event; the primary key is the dedup key.
        CREATE TABLE IF NOT EXISTS processed_events (
            event_id TEXT NOT NULL,
            topic TEXT NOT NULL,
            source TEXT NOT NULL,
            payload TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            PRIMARY KEY (event_id, topic)
        );

        -- Single "current stats" row, id = 1, overwritten on every update.
        CREATE TABLE IF NOT EXISTS stats (
            id INTEGER PRIMARY KEY,
            received INTEGER NOT NULL DEFAULT 0,
            duplicated_dropped INTEGER NOT NULL DEFAULT 0,
            topics TEXT NOT NULL DEFAULT '[]'
        );

        INSERT OR IGNORE INTO stats (id) VALUES (1);
        "#,
    )
    .map_err(|e| unavailable("create tables", e))?;

    Ok(())
}

fn unavailable(action: &str, err: rusqlite::Error) -> Error {
    Error::StorageUnavailable(format!("Failed to {}: {}", action, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_init_schema_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"processed_events".to_string()));
        assert!(tables.contains(&"stats".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_init_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM stats", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_primary_key_rejects_duplicate_dedup_key() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let insert = "INSERT OR IGNORE INTO processed_events
                      (event_id, topic, source, payload, timestamp)
                      VALUES ('e1', 't1', 's', '{}', '2025-01-01T00:00:00Z')";
        assert_eq!(conn.execute(insert, []).unwrap(), 1);
        assert_eq!(conn.execute(insert, []).unwrap(), 0);
    }

    #[test]
    fn test_newer_schema_version_refused() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        set_schema_version(&conn, SCHEMA_VERSION + 1).unwrap();

        assert!(matches!(
            init_schema(&conn),
            Err(Error::StorageUnavailable(_))
        ));
    }
}
