//! # SQLite Schema for the Table Store
//!
//! The durable store emulates a partitioned table on a single SQLite table.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ rows                                                         │
//! ├──────────────────┬───────────────┬──────────┬───────────────┤
//! │ partition_key PK │ row_key    PK │ etag     │ timestamp_ms  │ properties (JSON)
//! └──────────────────┴───────────────┴──────────┴───────────────┘
//! ```
//!
//! ## Design Decisions
//!
//! ### Why one table?
//!
//! The store is schema-less: heads, events and dedup markers are all just
//! rows distinguished by row key. A composite primary key on
//! (partition_key, row_key) gives point lookups and ordered range scans from
//! the same B-tree, which is exactly what the row-key grammar relies on.
//!
//! ### Why JSON for properties?
//!
//! Property bags are open-ended and typed per value. Storing the bag as
//! tagged JSON keeps each value's native type across a round trip without a
//! column per property.

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::{Error, Result};

// =============================================================================
// Schema Version
// =============================================================================

/// Current schema version. Increment when making breaking schema changes.
///
/// There are no migrations: a mismatch is reported as [`Error::Schema`].
const SCHEMA_VERSION: i32 = 1;

// =============================================================================
// DDL Statements
// =============================================================================

/// The `rows` table holds every row of every partition.
///
/// `WITHOUT ROWID` stores rows directly in primary-key order, so a range
/// scan over one partition walks contiguous pages.
const CREATE_ROWS: &str = r#"
CREATE TABLE IF NOT EXISTS rows (
    partition_key TEXT    NOT NULL,
    row_key       TEXT    NOT NULL,
    etag          TEXT    NOT NULL,
    timestamp_ms  INTEGER NOT NULL,
    properties    TEXT    NOT NULL,
    PRIMARY KEY (partition_key, row_key)
) WITHOUT ROWID
"#;

/// Key-value metadata, currently only the schema version.
const CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS tablestream_metadata (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

// =============================================================================
// Initialization
// =============================================================================

/// Applies pragmas, creates tables and verifies the schema version.
///
/// Idempotent: safe to call on every open.
pub fn initialize(conn: &Connection) -> Result<()> {
    // WAL mode: readers on other connections never block the writer.
    // In-memory databases report "memory" here, which is fine.
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;

    // Sync the WAL on commit but not on every page write.
    conn.execute_batch("PRAGMA synchronous = NORMAL")?;

    conn.execute_batch(CREATE_METADATA)?;
    conn.execute_batch(CREATE_ROWS)?;

    verify_or_set_version(conn)?;
    debug!(schema_version = SCHEMA_VERSION, "table store schema ready");
    Ok(())
}

/// Verifies the schema version, or records it for a new database.
fn verify_or_set_version(conn: &Connection) -> Result<()> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT value FROM tablestream_metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        None => {
            conn.execute(
                "INSERT INTO tablestream_metadata (key, value) VALUES ('schema_version', ?)",
                [SCHEMA_VERSION.to_string()],
            )?;
        }
        Some(v) if v == SCHEMA_VERSION.to_string() => {}
        Some(v) => {
            return Err(Error::Schema(format!(
                "schema version mismatch: database has version {v}, but this build requires {SCHEMA_VERSION}"
            )));
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
