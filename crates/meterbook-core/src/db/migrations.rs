//! Database migrations

use rusqlite::{Connection, OptionalExtension};

use crate::error::PersistenceError;

/// Current schema version
pub const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<(), PersistenceError> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }
    if version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Get the current schema version
pub fn get_version(conn: &Connection) -> Result<i32, PersistenceError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get::<_, i32>(0),
        )
        .optional()?
        .unwrap_or(0);

    Ok(version)
}

/// Migration to version 1: snapshot and sync state storage
fn migrate_v1(conn: &mut Connection) -> Result<(), PersistenceError> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        -- Whole-state rows keyed by name ('snapshot', 'sync_state')
        CREATE TABLE IF NOT EXISTS state (
            key TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );
        INSERT INTO schema_version (version) VALUES (1);",
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: merge anomaly log
fn migrate_v2(conn: &mut Connection) -> Result<(), PersistenceError> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS merge_anomalies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meter_type TEXT,
            reading_id TEXT,
            kind TEXT NOT NULL,
            recorded_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_merge_anomalies_recorded_at
            ON merge_anomalies(recorded_at DESC);
        INSERT INTO schema_version (version) VALUES (2);",
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version 2");
    Ok(())
}

/// Migration to version 3: anomalies on car documents and prices
fn migrate_v3(conn: &mut Connection) -> Result<(), PersistenceError> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "ALTER TABLE merge_anomalies ADD COLUMN field TEXT;
        INSERT INTO schema_version (version) VALUES (3);",
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn migrations_create_tables() {
        let mut conn = setup();
        run(&mut conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = setup();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn migration_v2_creates_anomaly_table() {
        let mut conn = setup();
        run(&mut conn).unwrap();

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = 'merge_anomalies'
                )",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert!(exists);
    }

    #[test]
    fn migration_v3_upgrades_existing_anomaly_log() {
        let mut conn = setup();
        migrate_v1(&mut conn).unwrap();
        migrate_v2(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO merge_anomalies (meter_type, reading_id, kind, recorded_at)
             VALUES ('gas', 'r1', 'missing id', 10)",
            [],
        )
        .unwrap();

        run(&mut conn).unwrap();

        let (kind, field): (String, Option<String>) = conn
            .query_row("SELECT kind, field FROM merge_anomalies", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(kind, "missing id");
        assert_eq!(field, None);
        assert_eq!(get_version(&conn).unwrap(), 3);
    }
}
