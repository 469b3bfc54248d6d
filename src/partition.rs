//! # Partition Addresses
//!
//! A [`Partition`] names where one logical stream lives in the table store.
//! The store's atomicity boundary is the physical partition, so streams that
//! must be written together can share one physical partition as separate
//! *virtual* partitions, distinguished by a row-key prefix:
//!
//! ```text
//! physical partition "tenant-7"
//! ├── orders|SS-HEAD                          ← virtual stream "orders"
//! ├── orders|SS-SE-0000000000000000001
//! ├── invoices|SS-HEAD                        ← virtual stream "invoices"
//! └── invoices|SS-UID-inv-created-99
//! ```
//!
//! ## Invariant
//!
//! The physical key never contains [`VIRTUAL_SEPARATOR`]. Otherwise the full
//! key `tenant|orders` would be ambiguous. This is checked at construction,
//! so a bad address never reaches the store.

use std::fmt;

use crate::error::{Error, Result};
use crate::keys::{self, VIRTUAL_SEPARATOR};

/// An immutable partition address, optionally narrowed to a virtual stream.
///
/// # Example
///
/// ```rust
/// use tablestream::Partition;
///
/// let whole = Partition::new("tenant-7")?;
/// assert_eq!(whole.key(), "tenant-7");
/// assert_eq!(whole.stream_row_key(), "SS-HEAD");
///
/// let orders = Partition::with_prefix("tenant-7", "orders")?;
/// assert_eq!(orders.key(), "tenant-7|orders");
/// assert_eq!(orders.stream_row_key(), "orders|SS-HEAD");
/// # Ok::<(), tablestream::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    partition_key: String,
    row_key_prefix: String,
    key: String,
    stream_row_key: String,
}

impl Partition {
    /// Addresses a whole physical partition.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPartition`] if `partition_key` is empty or contains
    /// the virtual separator.
    pub fn new(partition_key: impl Into<String>) -> Result<Self> {
        let partition_key = partition_key.into();
        validate_partition_key(&partition_key)?;

        Ok(Self {
            key: partition_key.clone(),
            stream_row_key: keys::stream_row_key(""),
            row_key_prefix: String::new(),
            partition_key,
        })
    }

    /// Addresses a virtual stream inside a physical partition.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPartition`] if either component is empty or the
    /// physical key contains the virtual separator.
    pub fn with_prefix(
        partition_key: impl Into<String>,
        stream_prefix: impl Into<String>,
    ) -> Result<Self> {
        let partition_key = partition_key.into();
        let stream_prefix = stream_prefix.into();
        validate_partition_key(&partition_key)?;
        if stream_prefix.is_empty() {
            return Err(Error::InvalidPartition(
                "virtual stream prefix cannot be empty".to_string(),
            ));
        }

        let row_key_prefix = format!("{stream_prefix}{VIRTUAL_SEPARATOR}");
        Ok(Self {
            key: format!("{partition_key}{VIRTUAL_SEPARATOR}{stream_prefix}"),
            stream_row_key: keys::stream_row_key(&row_key_prefix),
            row_key_prefix,
            partition_key,
        })
    }

    /// The physical partition key submitted to the store.
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// The virtual prefix including the trailing separator, or `""`.
    pub fn row_key_prefix(&self) -> &str {
        &self.row_key_prefix
    }

    /// Full key: the physical key, or `physical|prefix` for virtual streams.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_virtual(&self) -> bool {
        !self.row_key_prefix.is_empty()
    }

    /// Row key of this stream's head.
    pub fn stream_row_key(&self) -> &str {
        &self.stream_row_key
    }

    /// Row key of the event record at `version`.
    pub fn event_version_row_key(&self, version: i64) -> String {
        keys::event_version_row_key(&self.row_key_prefix, version)
    }

    /// Row key of the dedup marker for event `id`.
    pub fn event_id_row_key(&self, id: &str) -> String {
        keys::event_id_row_key(&self.row_key_prefix, id)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

fn validate_partition_key(partition_key: &str) -> Result<()> {
    if partition_key.is_empty() {
        return Err(Error::InvalidPartition("partition key cannot be empty".to_string()));
    }
    if partition_key.contains(VIRTUAL_SEPARATOR) {
        return Err(Error::InvalidPartition(format!(
            "partition key '{partition_key}' cannot contain virtual partition separator '{VIRTUAL_SEPARATOR}'"
        )));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
