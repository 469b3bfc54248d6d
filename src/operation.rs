//! # Write Operations and the Head Write-Mode Selector
//!
//! Every row written to the store is wrapped in a [`TableOperation`]. Event
//! records and dedup markers are always inserted. The stream head is the one
//! row that is written repeatedly, so its write shape has to be chosen:
//!
//! | version tag | property payload | mode      | meaning                          |
//! |-------------|------------------|-----------|----------------------------------|
//! | absent      | either           | `Insert`  | first write; fails if it exists  |
//! | present     | absent           | `Merge`   | advance the tail, keep metadata  |
//! | present     | present          | `Replace` | overwrite head metadata          |
//!
//! Merge and Replace carry the held tag as a precondition. The store refuses
//! them if another writer has since changed the head; that refusal is the
//! only mutual exclusion between competing writers.

use crate::row::TableRow;

/// How a row is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create the row; the key must be free.
    Insert,
    /// Overwrite the whole property bag, conditional on the version tag.
    Replace,
    /// Overwrite only the supplied properties, conditional on the version tag.
    Merge,
}

impl WriteMode {
    /// Chooses the head write mode from its in-memory state.
    ///
    /// This is the whole decision table; see the module docs.
    pub fn select(has_etag: bool, has_properties: bool) -> WriteMode {
        match (has_etag, has_properties) {
            (false, _) => WriteMode::Insert,
            (true, false) => WriteMode::Merge,
            (true, true) => WriteMode::Replace,
        }
    }
}

/// A single row write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum TableOperation {
    Insert(TableRow),
    Replace { row: TableRow, etag: String },
    Merge { row: TableRow, etag: String },
}

impl TableOperation {
    /// Builds the operation for `mode`, taking the precondition from the row.
    ///
    /// Returns `None` when a conditional mode is requested for a row that has
    /// no version tag.
    pub fn for_mode(mode: WriteMode, row: TableRow) -> Option<TableOperation> {
        match mode {
            WriteMode::Insert => Some(TableOperation::Insert(row)),
            WriteMode::Replace => {
                let etag = row.etag.clone()?;
                Some(TableOperation::Replace { row, etag })
            }
            WriteMode::Merge => {
                let etag = row.etag.clone()?;
                Some(TableOperation::Merge { row, etag })
            }
        }
    }

    pub fn mode(&self) -> WriteMode {
        match self {
            TableOperation::Insert(_) => WriteMode::Insert,
            TableOperation::Replace { .. } => WriteMode::Replace,
            TableOperation::Merge { .. } => WriteMode::Merge,
        }
    }

    pub fn row(&self) -> &TableRow {
        match self {
            TableOperation::Insert(row)
            | TableOperation::Replace { row, .. }
            | TableOperation::Merge { row, .. } => row,
        }
    }

    /// The version tag the store must still hold, for conditional modes.
    pub fn precondition(&self) -> Option<&str> {
        match self {
            TableOperation::Insert(_) => None,
            TableOperation::Replace { etag, .. } | TableOperation::Merge { etag, .. } => Some(etag),
        }
    }

    pub fn row_key(&self) -> &str {
        &self.row().row_key
    }
}
