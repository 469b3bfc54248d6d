//! # Error Handling for tablestream
//!
//! This module defines the error types used throughout the crate. A single
//! error enum ([`Error`]) represents every failure mode, from a malformed
//! partition key to a lost optimistic-concurrency race.
//!
//! ## Rust Pattern: thiserror
//!
//! We use the `thiserror` crate to derive `std::error::Error` implementations:
//! - `Display` comes from the `#[error(...)]` attributes
//! - `From` conversions come from the `#[from]` attributes
//!
//! ## Error Categories
//!
//! | Category | Examples | Typical Response |
//! |----------|----------|------------------|
//! | Configuration | Separator in partition key | Fix the caller |
//! | Concurrency | Stale version tag | Re-read the stream and retry |
//! | Duplicate | Stream already provisioned, event id reused | Treat as already done |
//! | Serialization | Reserved property name, malformed row | Fix the caller / investigate |
//! | Internal | SQLite error, JSON error | Log and investigate |
//!
//! Nothing in this crate retries. Every error reaches the caller unchanged.

use std::fmt;

use thiserror::Error;

// =============================================================================
// Store Conflict Kinds
// =============================================================================

/// The two ways a conditional row write can be refused by the table store.
///
/// The store reports these raw; the stream layer maps them onto
/// [`Error::ConcurrencyConflict`], [`Error::StreamAlreadyExists`] or
/// [`Error::DuplicateEvent`] depending on which kind of row failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// A Replace or Merge carried a version tag that no longer matches.
    PreconditionFailed,

    /// An Insert targeted a row key that is already taken.
    AlreadyExists,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::PreconditionFailed => write!(f, "precondition failed"),
            ConflictKind::AlreadyExists => write!(f, "row already exists"),
        }
    }
}

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur in tablestream operations.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors (never reach the store)
    // =========================================================================

    /// A partition address could not be constructed.
    ///
    /// Raised synchronously by [`Partition::new`](crate::Partition::new) and
    /// [`Partition::with_prefix`](crate::Partition::with_prefix) when a key is
    /// empty or the physical key contains the virtual separator.
    #[error("invalid partition: {0}")]
    InvalidPartition(String),

    /// The caller passed arguments that can never succeed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // =========================================================================
    // Conflict Errors (client decides whether to re-read and retry)
    // =========================================================================

    /// Optimistic concurrency conflict: another writer advanced the stream.
    ///
    /// # When This Happens
    ///
    /// - The stream head was written with a version tag that the store no
    ///   longer holds.
    /// - An event row for the version being written already exists.
    ///
    /// # Recovery
    ///
    /// 1. Re-open the stream to pick up the current version tag
    /// 2. Re-apply business logic
    /// 3. Retry the write
    #[error("concurrency conflict in partition '{partition}' at row '{row_key}'")]
    ConcurrencyConflict {
        /// Full key of the partition address.
        partition: String,
        /// Row key whose write was refused.
        row_key: String,
    },

    /// A stream head was inserted where one already exists.
    #[error("stream '{partition}' already exists")]
    StreamAlreadyExists {
        /// Full key of the partition address.
        partition: String,
    },

    /// An event identifier was already claimed by a dedup marker.
    ///
    /// This is the idempotency signal: the event was committed earlier, so
    /// the caller can usually treat the append as done.
    #[error("duplicate event '{id}' in stream '{partition}' (attempted version {version})")]
    DuplicateEvent {
        /// Full key of the partition address.
        partition: String,
        /// The caller-supplied event identifier.
        id: String,
        /// The version this append tried to assign to the event.
        version: i64,
    },

    /// The stream head row does not exist.
    #[error("stream '{partition}' not found")]
    StreamNotFound {
        /// Full key of the partition address.
        partition: String,
    },

    // =========================================================================
    // Serialization Errors
    // =========================================================================

    /// A custom property name collides with a fixed field name.
    #[error("property name '{name}' is reserved")]
    ReservedProperty {
        /// The offending property name.
        name: String,
    },

    /// A custom property value the store cannot persist faithfully.
    ///
    /// Raised for non-finite `Double` values (`NaN`, `±Infinity`), which
    /// have no JSON representation.
    #[error("property '{name}' cannot be stored: {reason}")]
    InvalidProperty {
        /// The offending property name.
        name: String,
        /// What is wrong with its value.
        reason: String,
    },

    /// A stored row is missing a fixed field or carries the wrong type.
    #[error("malformed row '{row_key}': {reason}")]
    MalformedRow {
        /// Row key of the offending row.
        row_key: String,
        /// What was wrong with it.
        reason: String,
    },

    // =========================================================================
    // Store Errors
    // =========================================================================

    /// An append would need more operations than one atomic batch allows.
    #[error("batch of {operations} operations exceeds the maximum of {max}")]
    BatchTooLarge {
        /// Operations the batch would contain.
        operations: usize,
        /// The store's ceiling.
        max: usize,
    },

    /// Raw conflict reported by the table store for one row of a batch.
    #[error("table conflict at row '{row_key}': {kind}")]
    TableConflict {
        /// Row key of the operation that failed.
        row_key: String,
        /// Why the store refused it.
        kind: ConflictKind,
    },

    /// The SQLite schema version does not match this build.
    #[error("schema error: {0}")]
    Schema(String),

    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A property bag could not be encoded or decoded as JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking store task panicked or was cancelled.
    #[error("task join error: {0}")]
    Join(String),
}

impl Error {
    /// Returns true for the "someone else wrote first" family of errors.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::ConcurrencyConflict { .. }
                | Error::StreamAlreadyExists { .. }
                | Error::DuplicateEvent { .. }
                | Error::TableConflict { .. }
        )
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Join(err.to_string())
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================
