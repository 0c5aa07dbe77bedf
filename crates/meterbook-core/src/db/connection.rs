//! Database connection management

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::migrations;
use super::persistence::Persistence;
use crate::error::PersistenceError;
use crate::merge::MergeAnomaly;
use crate::models::{Snapshot, SyncState};
use crate::util::unix_millis_now;

const SNAPSHOT_KEY: &str = "snapshot";
const SYNC_STATE_KEY: &str = "sync_state";

/// A merge anomaly as stored in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnomalyRecord {
    pub id: i64,
    pub meter_type: Option<String>,
    pub reading_id: Option<String>,
    /// `carDocuments.<name>` or `prices.<name>` for non-reading records
    pub field: Option<String>,
    pub kind: String,
    pub recorded_at: i64,
}

/// `SQLite`-backed local persistence.
///
/// The merged snapshot and sync state are stored as JSON rows; writes replace
/// a whole row inside one statement, so a crash never leaves a half-applied
/// merge behind.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        Self::init(conn)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self, PersistenceError> {
        Self::configure(&conn)?;
        migrations::run(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn configure(conn: &Connection) -> Result<(), PersistenceError> {
        // journal_mode is unsupported for in-memory databases
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn
            .lock()
            .map_err(|_| PersistenceError::Corrupt("connection lock poisoned".to_string()))
    }

    fn read_row<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistenceError> {
        let conn = self.lock()?;
        let payload = conn
            .query_row(
                "SELECT payload FROM state WHERE key = ?",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        payload
            .map(|payload| {
                serde_json::from_str(&payload).map_err(|error| {
                    PersistenceError::Corrupt(format!("stored {key} is unreadable: {error}"))
                })
            })
            .transpose()
    }

    fn write_row<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PersistenceError> {
        let payload = serde_json::to_string(value)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO state (key, payload, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
            params![key, payload, unix_millis_now()],
        )?;
        Ok(())
    }

    /// Most recent logged anomalies, newest first.
    pub fn list_anomalies(&self, limit: usize) -> Result<Vec<AnomalyRecord>, PersistenceError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, meter_type, reading_id, field, kind, recorded_at
             FROM merge_anomalies
             ORDER BY recorded_at DESC, id DESC
             LIMIT ?",
        )?;

        let records = stmt
            .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
                Ok(AnomalyRecord {
                    id: row.get(0)?,
                    meter_type: row.get(1)?,
                    reading_id: row.get(2)?,
                    field: row.get(3)?,
                    kind: row.get(4)?,
                    recorded_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }
}

impl Persistence for Database {
    fn load(&self) -> Result<Snapshot, PersistenceError> {
        Ok(self.read_row(SNAPSHOT_KEY)?.unwrap_or_default())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        self.write_row(SNAPSHOT_KEY, snapshot)
    }

    fn load_sync_state(&self) -> Result<Option<SyncState>, PersistenceError> {
        self.read_row(SYNC_STATE_KEY)
    }

    fn save_sync_state(&self, state: &SyncState) -> Result<(), PersistenceError> {
        self.write_row(SYNC_STATE_KEY, state)
    }

    fn record_anomalies(
        &self,
        anomalies: &[MergeAnomaly],
        recorded_at: i64,
    ) -> Result<(), PersistenceError> {
        if anomalies.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO merge_anomalies (meter_type, reading_id, field, kind, recorded_at)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            for anomaly in anomalies {
                stmt.execute(params![
                    anomaly.meter_type.map(|meter| meter.to_string()),
                    anomaly.reading_id.as_ref().map(ToString::to_string),
                    anomaly.field.map(|field| field.to_string()),
                    anomaly.kind.to_string(),
                    recorded_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
