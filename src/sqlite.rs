//! # SQLite-Backed Table Store
//!
//! [`SqliteStore`] implements [`TableStore`] on one SQLite connection. Each
//! batch runs inside a single SQLite transaction, which gives the
//! all-or-nothing guarantee the stream layer depends on:
//!
//! ```text
//! execute_batch(pk, ops)
//!   BEGIN
//!     for op in ops:
//!       SELECT current row          ← staged writes are visible here
//!       apply insert/replace/merge  ← may fail with TableConflict
//!       INSERT OR REPLACE row
//!   COMMIT                          ← or ROLLBACK when the transaction drops
//! ```
//!
//! ## The `!Sync` Connection
//!
//! `rusqlite::Connection` uses `RefCell` internally and cannot be shared
//! between threads by reference. The store wraps it in a mutex, which also
//! serializes batches against each other.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::config::TableConfig;
use crate::error::{Error, Result};
use crate::operation::TableOperation;
use crate::property::PropertyMap;
use crate::row::TableRow;
use crate::schema;
use crate::store::{apply_operation, new_etag, now_millis, validate_batch, TableStore};

/// A durable [`TableStore`] on SQLite.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    config: TableConfig,
}

impl SqliteStore {
    /// Opens (or creates) a database file with default configuration.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, TableConfig::default())
    }

    /// Opens (or creates) a database file.
    pub fn open_with_config(path: impl AsRef<Path>, config: TableConfig) -> Result<Self> {
        debug!(path = %path.as_ref().display(), "opening sqlite table store");
        let conn = Connection::open(path)?;
        Self::from_connection(conn, config)
    }

    /// Creates a private in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, TableConfig::default())
    }

    fn from_connection(conn: Connection, config: TableConfig) -> Result<Self> {
        conn.busy_timeout(config.busy_timeout)?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }
}

impl TableStore for SqliteStore {
    fn retrieve(&self, partition_key: &str, row_key: &str) -> Result<Option<TableRow>> {
        let conn = self.conn.lock();
        select_row(&conn, partition_key, row_key)
    }

    fn query_range(
        &self,
        partition_key: &str,
        from_row_key: &str,
        to_row_key: &str,
    ) -> Result<Vec<TableRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT partition_key, row_key, etag, timestamp_ms, properties
             FROM rows
             WHERE partition_key = ? AND row_key >= ? AND row_key <= ?
             ORDER BY row_key",
        )?;

        let raw = stmt
            .query_map(params![partition_key, from_row_key, to_row_key], read_raw_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.into_iter().map(RawRow::into_row).collect()
    }

    fn execute_batch(
        &self,
        partition_key: &str,
        operations: Vec<TableOperation>,
    ) -> Result<Vec<TableRow>> {
        validate_batch(partition_key, &operations, self.config.max_batch_size)?;
        debug!(partition = partition_key, operations = operations.len(), "executing batch");

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let timestamp = now_millis();

        let mut written = Vec::with_capacity(operations.len());
        for op in operations {
            let current = select_row(&tx, partition_key, op.row_key())?;
            let row = apply_operation(current.as_ref(), op, new_etag(), timestamp)?;
            upsert_row(&tx, &row)?;
            written.push(row);
        }

        tx.commit()?;
        Ok(written)
    }

    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }
}

// =============================================================================
// Row Mapping
// =============================================================================

/// Column values as read, before JSON and timestamp decoding.
struct RawRow {
    partition_key: String,
    row_key: String,
    etag: String,
    timestamp_ms: i64,
    properties: String,
}

impl RawRow {
    fn into_row(self) -> Result<TableRow> {
        let properties: PropertyMap = serde_json::from_str(&self.properties)?;
        Ok(TableRow {
            timestamp: Some(from_millis(self.timestamp_ms, &self.row_key)?),
            partition_key: self.partition_key,
            row_key: self.row_key,
            etag: Some(self.etag),
            properties,
        })
    }
}

fn read_raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        partition_key: row.get(0)?,
        row_key: row.get(1)?,
        etag: row.get(2)?,
        timestamp_ms: row.get(3)?,
        properties: row.get(4)?,
    })
}

fn select_row(conn: &Connection, partition_key: &str, row_key: &str) -> Result<Option<TableRow>> {
    let raw = conn
        .prepare_cached(
            "SELECT partition_key, row_key, etag, timestamp_ms, properties
             FROM rows WHERE partition_key = ? AND row_key = ?",
        )?
        .query_row(params![partition_key, row_key], read_raw_row)
        .optional()?;

    raw.map(RawRow::into_row).transpose()
}

fn upsert_row(conn: &Connection, row: &TableRow) -> Result<()> {
    let (Some(etag), Some(timestamp)) = (&row.etag, row.timestamp) else {
        return Err(Error::MalformedRow {
            row_key: row.row_key.clone(),
            reason: "written row has no version tag or timestamp".to_string(),
        });
    };

    conn.prepare_cached(
        "INSERT OR REPLACE INTO rows (partition_key, row_key, etag, timestamp_ms, properties)
         VALUES (?, ?, ?, ?, ?)",
    )?
    .execute(params![
        row.partition_key,
        row.row_key,
        etag,
        timestamp.timestamp_millis(),
        serde_json::to_string(&row.properties)?,
    ])?;
    Ok(())
}

fn from_millis(ms: i64, row_key: &str) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Error::MalformedRow {
            row_key: row_key.to_string(),
            reason: format!("timestamp {ms} is out of range"),
        })
}

// =============================================================================
// Tests
// =============================================================================
