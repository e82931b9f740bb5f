use crate::{merge, Result, Storage, StorageError};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use telemon_common::types::{Metric, MetricKind};

const METRICS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metrics (
    name TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    value REAL NOT NULL
);
";

/// SQLite-backed [`Storage`] with the same merge rules as
/// [`MemStorage`](crate::MemStorage).
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(METRICS_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Checks that the database still answers queries.
    pub fn ping(&self) -> Result<()> {
        let conn = self.lock_conn();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

fn parse_kind(raw: &str) -> Result<MetricKind> {
    raw.parse()
        .map_err(|_| StorageError::Other(format!("unexpected kind '{raw}' in metrics table")))
}

impl Storage for SqliteStorage {
    fn add_metric(&self, kind: MetricKind, name: &str, value: f64) -> Result<()> {
        let mut conn = self.lock_conn();
        let tx = conn.transaction()?;
        let existing = tx
            .query_row(
                "SELECT kind, value FROM metrics WHERE name = ?1",
                rusqlite::params![name],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
            )
            .optional()?;

        let merged = match existing {
            Some((stored_kind, stored_value)) => {
                let mut metric = Metric::new(parse_kind(&stored_kind)?, name, stored_value);
                merge(&mut metric, kind, value)?;
                metric
            }
            None => Metric::new(kind, name, value),
        };

        tx.execute(
            "INSERT INTO metrics (name, kind, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            rusqlite::params![merged.id, merged.kind.as_str(), merged.value],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_metric(&self, name: &str) -> Result<f64> {
        let conn = self.lock_conn();
        conn.query_row(
            "SELECT value FROM metrics WHERE name = ?1",
            rusqlite::params![name],
            |row| row.get::<_, f64>(0),
        )
        .optional()?
        .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn get_all_metrics(&self) -> Result<HashMap<String, Metric>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached("SELECT name, kind, value FROM metrics")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        let mut results = HashMap::new();
        for row in rows {
            let (name, kind, value) = row?;
            let metric = Metric::new(parse_kind(&kind)?, name.clone(), value);
            results.insert(name, metric);
        }
        Ok(results)
    }

    fn get_record(&self, name: &str) -> Result<Metric> {
        let conn = self.lock_conn();
        let row = conn
            .query_row(
                "SELECT kind, value FROM metrics WHERE name = ?1",
                rusqlite::params![name],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
            )
            .optional()?;
        match row {
            Some((kind, value)) => Ok(Metric::new(parse_kind(&kind)?, name, value)),
            None => Err(StorageError::NotFound(name.to_string())),
        }
    }
}
