//! # Table Store Configuration
//!
//! Tunables shared by the [`MemoryStore`](crate::MemoryStore) and
//! [`SqliteStore`](crate::SqliteStore) implementations.

use std::time::Duration;

/// Maximum number of operations in one atomic batch.
///
/// This matches the ceiling of the hosted table stores this crate models.
/// An append of N events with ids needs `1 + 2N` operations, so at most 49
/// identified events fit in one append.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Default time SQLite waits on a locked database before giving up.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Configuration for a table store.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Maximum operations accepted by a single `execute_batch` call.
    pub max_batch_size: usize,

    /// How long the SQLite store waits for a competing connection's lock.
    ///
    /// Ignored by the in-memory store.
    pub busy_timeout: Duration,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

impl TableConfig {
    /// Overrides the batch ceiling (builder pattern).
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Overrides the SQLite busy timeout (builder pattern).
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}
