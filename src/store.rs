//! # Table Store Interface
//!
//! The table store is an external collaborator. This crate needs exactly
//! three things from it:
//!
//! 1. Point reads by (partition key, row key)
//! 2. Ascending row-key range reads inside one partition
//! 3. Atomic, all-or-nothing batches scoped to one partition, where each row
//!    is inserted, replaced or merged, optionally conditional on a version tag
//!
//! [`TableStore`] captures that contract. Two implementations ship with the
//! crate: [`MemoryStore`] (this module) and [`SqliteStore`](crate::SqliteStore).
//!
//! ## Batch Rules
//!
//! ```text
//! execute_batch(pk, [op1, op2, op3])
//!   │
//!   ├── reject before touching state: empty, > max_batch_size,
//!   │   a row from another partition, a row key twice,
//!   │   a non-finite Double
//!   │
//!   ├── apply op1, op2, op3 in order against a staged view
//!   │     first refusal → TableConflict { row_key, kind }, nothing written
//!   │
//!   └── commit staged rows, each with a fresh version tag
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::config::TableConfig;
use crate::error::{ConflictKind, Error, Result};
use crate::operation::TableOperation;
use crate::property::PropertyValue;
use crate::row::TableRow;

// =============================================================================
// Trait
// =============================================================================

/// A partitioned, schema-less table store with optimistic concurrency.
///
/// # Rust Pattern: Send + Sync Supertraits
///
/// Stores are shared between threads (the async facade moves calls onto
/// Tokio's blocking pool), so every implementation must be thread-safe.
pub trait TableStore: Send + Sync {
    /// Reads one row, or `None` if the key is free.
    fn retrieve(&self, partition_key: &str, row_key: &str) -> Result<Option<TableRow>>;

    /// Reads every row with `from_row_key <= row_key <= to_row_key`, ascending.
    fn query_range(
        &self,
        partition_key: &str,
        from_row_key: &str,
        to_row_key: &str,
    ) -> Result<Vec<TableRow>>;

    /// Applies `operations` atomically and returns the rows as written.
    ///
    /// # Errors
    ///
    /// - [`Error::TableConflict`] naming the first refused row
    /// - [`Error::BatchTooLarge`] / [`Error::InvalidArgument`] for batches
    ///   that break the rules above
    fn execute_batch(
        &self,
        partition_key: &str,
        operations: Vec<TableOperation>,
    ) -> Result<Vec<TableRow>>;

    /// Operation ceiling of one batch.
    fn max_batch_size(&self) -> usize;
}

// =============================================================================
// Shared Batch Semantics
// =============================================================================

/// Checks the structural batch rules shared by every store.
pub(crate) fn validate_batch(
    partition_key: &str,
    operations: &[TableOperation],
    max_batch_size: usize,
) -> Result<()> {
    if operations.is_empty() {
        return Err(Error::InvalidArgument("batch cannot be empty".to_string()));
    }
    if operations.len() > max_batch_size {
        return Err(Error::BatchTooLarge {
            operations: operations.len(),
            max: max_batch_size,
        });
    }

    let mut seen = HashSet::with_capacity(operations.len());
    for op in operations {
        let row = op.row();
        if row.partition_key != partition_key {
            return Err(Error::InvalidArgument(format!(
                "row '{}' belongs to partition '{}', not '{}'",
                row.row_key, row.partition_key, partition_key
            )));
        }
        if !seen.insert(row.row_key.as_str()) {
            return Err(Error::InvalidArgument(format!(
                "row '{}' appears more than once in the batch",
                row.row_key
            )));
        }
        // JSON has no NaN or infinity; such a row could be written but never read.
        for (name, value) in &row.properties {
            if let PropertyValue::Double(v) = value {
                if !v.is_finite() {
                    return Err(Error::InvalidProperty {
                        name: name.clone(),
                        reason: format!("Double value {v} in row '{}' is not finite", row.row_key),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Computes the row that results from applying `op` over `current`.
///
/// The returned row carries `etag` and `timestamp` as its new version tag
/// and modification time.
pub(crate) fn apply_operation(
    current: Option<&TableRow>,
    op: TableOperation,
    etag: String,
    timestamp: DateTime<Utc>,
) -> Result<TableRow> {
    let conflict = |row_key: &str, kind| Error::TableConflict {
        row_key: row_key.to_string(),
        kind,
    };

    let mut written = match op {
        TableOperation::Insert(row) => {
            if current.is_some() {
                return Err(conflict(&row.row_key, ConflictKind::AlreadyExists));
            }
            row
        }
        TableOperation::Replace { row, etag: expected } => match current {
            Some(existing) if existing.etag.as_deref() == Some(expected.as_str()) => row,
            _ => return Err(conflict(&row.row_key, ConflictKind::PreconditionFailed)),
        },
        TableOperation::Merge { row, etag: expected } => match current {
            Some(existing) if existing.etag.as_deref() == Some(expected.as_str()) => {
                let mut merged = existing.clone();
                merged.properties.extend(row.properties);
                merged
            }
            _ => return Err(conflict(&row.row_key, ConflictKind::PreconditionFailed)),
        },
    };

    written.etag = Some(etag);
    written.timestamp = Some(timestamp);
    Ok(written)
}

/// Issues a fresh opaque version tag.
pub(crate) fn new_etag() -> String {
    format!("W/\"{}\"", Uuid::new_v4())
}

/// Current time truncated to the millisecond precision stores persist.
pub(crate) fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    Utc.timestamp_millis_opt(now.timestamp_millis())
        .single()
        .unwrap_or(now)
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// A [`TableStore`] held entirely in process memory.
///
/// Rows are kept in one ordered map keyed by (partition key, row key), so
/// range reads come straight out of `BTreeMap::range`. A single mutex makes
/// every batch atomic with respect to every other call.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<(String, String), TableRow>>,
    config: TableConfig,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(TableConfig::default())
    }

    pub fn with_config(config: TableConfig) -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            config,
        }
    }

    /// Number of rows stored across all partitions.
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

impl TableStore for MemoryStore {
    fn retrieve(&self, partition_key: &str, row_key: &str) -> Result<Option<TableRow>> {
        let rows = self.rows.lock();
        Ok(rows
            .get(&(partition_key.to_string(), row_key.to_string()))
            .cloned())
    }

    fn query_range(
        &self,
        partition_key: &str,
        from_row_key: &str,
        to_row_key: &str,
    ) -> Result<Vec<TableRow>> {
        if from_row_key > to_row_key {
            return Ok(Vec::new());
        }
        let from = (partition_key.to_string(), from_row_key.to_string());
        let to = (partition_key.to_string(), to_row_key.to_string());

        let rows = self.rows.lock();
        Ok(rows.range(from..=to).map(|(_, row)| row.clone()).collect())
    }

    fn execute_batch(
        &self,
        partition_key: &str,
        operations: Vec<TableOperation>,
    ) -> Result<Vec<TableRow>> {
        validate_batch(partition_key, &operations, self.config.max_batch_size)?;
        debug!(partition = partition_key, operations = operations.len(), "executing batch");

        let mut rows = self.rows.lock();
        let timestamp = now_millis();

        // Stage every write first; the map is only touched once all succeed.
        let mut staged: HashMap<String, TableRow> = HashMap::with_capacity(operations.len());
        let mut order = Vec::with_capacity(operations.len());
        for op in operations {
            let row_key = op.row_key().to_string();
            let key = (partition_key.to_string(), row_key.clone());
            let current = staged.get(&row_key).or_else(|| rows.get(&key));
            trace!(row_key = %row_key, mode = ?op.mode(), "applying operation");

            let written = apply_operation(current, op, new_etag(), timestamp)?;
            staged.insert(row_key.clone(), written);
            order.push(row_key);
        }

        let mut result = Vec::with_capacity(order.len());
        for row_key in order {
            if let Some(row) = staged.remove(&row_key) {
                rows.insert((partition_key.to_string(), row_key), row.clone());
                result.push(row);
            }
        }
        Ok(result)
    }

    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(row_key: &str) -> TableRow {
        TableRow::new("p", row_key).with_property("Version", 1i64)
    }

    #[test]
    fn test_insert_then_retrieve() {
        let store = MemoryStore::new();
        let written = store
            .execute_batch("p", vec![TableOperation::Insert(row("a"))])
            .unwrap();

        assert_eq!(written.len(), 1);
        assert!(written[0].etag.is_some());
        assert!(written[0].timestamp.is_some());

        let read = store.retrieve("p", "a").unwrap().unwrap();
        assert_eq!(read, written[0]);
        assert!(store.retrieve("p", "b").unwrap().is_none());
        assert!(store.retrieve("q", "a").unwrap().is_none());
    }

    #[test]
    fn test_insert_conflict_is_already_exists() {
        let store = MemoryStore::new();
        store.execute_batch("p", vec![TableOperation::Insert(row("a"))]).unwrap();

        let err = store
            .execute_batch("p", vec![TableOperation::Insert(row("a"))])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::TableConflict { ref row_key, kind: ConflictKind::AlreadyExists } if row_key == "a"
        ));
    }

    #[test]
    fn test_stale_etag_is_precondition_failed() {
        let store = MemoryStore::new();
        let first = store.execute_batch("p", vec![TableOperation::Insert(row("a"))]).unwrap();
        let etag = first[0].etag.clone().unwrap();

        store
            .execute_batch("p", vec![TableOperation::Merge { row: row("a"), etag: etag.clone() }])
            .unwrap();

        let err = store
            .execute_batch("p", vec![TableOperation::Replace { row: row("a"), etag }])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::TableConflict { kind: ConflictKind::PreconditionFailed, .. }
        ));
    }

    #[test]
    fn test_merge_keeps_unmentioned_properties() {
        let store = MemoryStore::new();
        let first = store
            .execute_batch(
                "p",
                vec![TableOperation::Insert(row("h").with_property("Owner", "ops"))],
            )
            .unwrap();

        let merge = TableRow::new("p", "h").with_property("Version", 2i64);
        let merged = store
            .execute_batch(
                "p",
                vec![TableOperation::Merge { row: merge, etag: first[0].etag.clone().unwrap() }],
            )
            .unwrap();
        assert_eq!(merged[0].get("Owner").and_then(|v| v.as_str()), Some("ops"));
        assert_eq!(merged[0].get("Version").and_then(|v| v.as_i64()), Some(2));
        assert_ne!(merged[0].etag, first[0].etag);

        let replace = TableRow::new("p", "h").with_property("Version", 3i64);
        let replaced = store
            .execute_batch(
                "p",
                vec![TableOperation::Replace { row: replace, etag: merged[0].etag.clone().unwrap() }],
            )
            .unwrap();
        assert!(replaced[0].get("Owner").is_none());
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.execute_batch("p", vec![TableOperation::Insert(row("b"))]).unwrap();

        let err = store
            .execute_batch(
                "p",
                vec![TableOperation::Insert(row("a")), TableOperation::Insert(row("b"))],
            )
            .unwrap_err();
        assert!(matches!(err, Error::TableConflict { ref row_key, .. } if row_key == "b"));
        assert!(store.retrieve("p", "a").unwrap().is_none(), "first op must be rolled back");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_batch_rules() {
        let store = MemoryStore::with_config(TableConfig::default().with_max_batch_size(2));

        let err = store.execute_batch("p", vec![]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let ops = vec![
            TableOperation::Insert(row("a")),
            TableOperation::Insert(row("b")),
            TableOperation::Insert(row("c")),
        ];
        let err = store.execute_batch("p", ops).unwrap_err();
        assert!(matches!(err, Error::BatchTooLarge { operations: 3, max: 2 }));

        let err = store
            .execute_batch("q", vec![TableOperation::Insert(row("a"))])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = store
            .execute_batch(
                "p",
                vec![TableOperation::Insert(row("a")), TableOperation::Insert(row("a"))],
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_query_range_is_inclusive_and_ordered() {
        let store = MemoryStore::new();
        let ops = ["k3", "k1", "k2", "k4"]
            .iter()
            .map(|k| TableOperation::Insert(row(k)))
            .collect();
        store.execute_batch("p", ops).unwrap();

        let keys: Vec<String> = store
            .query_range("p", "k2", "k3")
            .unwrap()
            .into_iter()
            .map(|r| r.row_key)
            .collect();
        assert_eq!(keys, vec!["k2", "k3"]);
        assert!(store.query_range("p", "k3", "k2").unwrap().is_empty());
        assert!(store.query_range("other", "k1", "k4").unwrap().is_empty());
    }
}
