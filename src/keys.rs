//! # Row-Key Codec
//!
//! Derives the row keys for the three row kinds that live inside one
//! partition. The grammar is a persisted format and must never change:
//!
//! ```text
//! <virtualPrefix?>SS-HEAD                                -- stream head
//! <virtualPrefix?>SS-SE-<version:19-digit-zero-padded>   -- event record
//! <virtualPrefix?>SS-UID-<eventIdentifier>               -- dedup marker
//! virtualPrefix = <streamPrefix> '|'                     -- only when sub-partitioning
//! ```
//!
//! ## Why Zero-Padding?
//!
//! The store orders rows by comparing row keys as strings. Without padding,
//! `SS-SE-10` would sort before `SS-SE-9`. Nineteen digits covers every
//! positive `i64`, so lexicographic order equals numeric order:
//!
//! ```text
//! SS-SE-0000000000000000009
//! SS-SE-0000000000000000010
//! ```
//!
//! All functions here are pure; address validation happens when the
//! [`Partition`](crate::Partition) is built.

/// Separator between a physical partition key and a virtual stream prefix.
pub const VIRTUAL_SEPARATOR: char = '|';

/// Fixed row key of the stream head (after the virtual prefix).
pub const STREAM_ROW_KEY: &str = "SS-HEAD";

/// Row-key prefix of event records.
pub const EVENT_ROW_KEY_PREFIX: &str = "SS-SE-";

/// Row-key prefix of dedup markers.
pub const EVENT_ID_ROW_KEY_PREFIX: &str = "SS-UID-";

/// Width of the zero-padded version in event row keys.
pub const VERSION_WIDTH: usize = 19;

/// Row key of the stream head under `prefix`.
pub fn stream_row_key(prefix: &str) -> String {
    format!("{prefix}{STREAM_ROW_KEY}")
}

/// Row key of the event record with `version` under `prefix`.
pub fn event_version_row_key(prefix: &str, version: i64) -> String {
    format!("{prefix}{EVENT_ROW_KEY_PREFIX}{version:0width$}", width = VERSION_WIDTH)
}

/// Row key of the dedup marker for `id` under `prefix`.
///
/// The identifier is used verbatim. Callers must keep characters the store
/// forbids in row keys out of their identifiers.
pub fn event_id_row_key(prefix: &str, id: &str) -> String {
    format!("{prefix}{EVENT_ID_ROW_KEY_PREFIX}{id}")
}

// =============================================================================
// Row Kind Classification
// =============================================================================

/// The closed set of row kinds that share a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Head,
    Event,
    DedupMarker,
}

impl RowKind {
    /// Classifies a row key relative to a virtual prefix.
    ///
    /// Returns `None` for keys that belong to another virtual stream or were
    /// not written by this crate.
    pub fn classify(prefix: &str, row_key: &str) -> Option<RowKind> {
        let rest = row_key.strip_prefix(prefix)?;
        if rest == STREAM_ROW_KEY {
            Some(RowKind::Head)
        } else if rest.starts_with(EVENT_ROW_KEY_PREFIX) {
            Some(RowKind::Event)
        } else if rest.starts_with(EVENT_ID_ROW_KEY_PREFIX) {
            Some(RowKind::DedupMarker)
        } else {
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
