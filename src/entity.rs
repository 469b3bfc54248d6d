//! # Entity Model
//!
//! Three kinds of rows share a stream's partition:
//!
//! ```text
//! ┌──────────────────┬───────────────────────────┬──────────────────────────────┐
//! │ Kind             │ Row key                   │ Fixed fields                 │
//! ├──────────────────┼───────────────────────────┼──────────────────────────────┤
//! │ StreamEntity     │ <p>SS-HEAD                │ Version (+ tag, timestamp)   │
//! │ EventEntity      │ <p>SS-SE-<version:019>    │ Version                      │
//! │ EventIdEntity    │ <p>SS-UID-<id>            │ Version                      │
//! └──────────────────┴───────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Heads and events also carry caller-defined properties, flattened into the
//! same bag as the fixed fields. Dedup markers carry nothing else: their
//! existence is the whole point.
//!
//! ## Rust Pattern: Tagged Variants Instead of a Row Base Class
//!
//! [`Entity`] is a closed enum over the three kinds. [`Entity::from_row`]
//! selects the variant by row-key prefix, and each variant owns its own
//! conversion to and from [`TableRow`].

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::keys::{RowKind, EVENT_ID_ROW_KEY_PREFIX};
use crate::operation::{TableOperation, WriteMode};
use crate::partition::Partition;
use crate::property::{Properties, PropertyValue};
use crate::row::TableRow;

/// Name of the fixed version field on every row kind.
pub const VERSION_PROPERTY: &str = "Version";

/// Fixed fields of heads and events, unavailable as custom names.
pub const FIXED_PROPERTIES: [&str; 1] = [VERSION_PROPERTY];

// =============================================================================
// Stream Head
// =============================================================================

/// The head row of a stream: its current version and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntity {
    pub partition: Partition,

    /// Store-issued tag. `None` means the head has never been persisted.
    pub etag: Option<String>,

    pub timestamp: Option<DateTime<Utc>>,

    /// Version of the last event; 0 for an empty stream.
    pub version: i64,

    /// Custom properties to write with this head.
    ///
    /// `None` means "no property payload": a persisted head is then merged,
    /// leaving stored metadata alone. On read, a head with no custom
    /// properties comes back as `None`.
    pub properties: Option<Properties>,
}

impl StreamEntity {
    pub fn new(
        partition: Partition,
        etag: Option<String>,
        version: i64,
        properties: Option<Properties>,
    ) -> Self {
        Self {
            partition,
            etag,
            timestamp: None,
            version,
            properties,
        }
    }

    /// Serializes the head into a store row.
    pub fn to_row(&self) -> Result<TableRow> {
        let mut row = TableRow::new(self.partition.partition_key(), self.partition.stream_row_key())
            .with_property(VERSION_PROPERTY, self.version);
        row.etag = self.etag.clone();
        row.timestamp = self.timestamp;
        if let Some(properties) = &self.properties {
            properties.write_to(&mut row.properties, &FIXED_PROPERTIES)?;
        }
        Ok(row)
    }

    /// Parses a head from a stored row.
    pub fn from_row(partition: &Partition, row: &TableRow) -> Result<Self> {
        let version = read_version(row)?;
        let properties = Properties::from_bag(&row.properties, &FIXED_PROPERTIES);
        Ok(Self {
            partition: partition.clone(),
            etag: row.etag.clone(),
            timestamp: row.timestamp,
            version,
            properties: (!properties.is_empty()).then_some(properties),
        })
    }

    /// The write mode for this head. See [`WriteMode::select`].
    pub fn write_mode(&self) -> WriteMode {
        WriteMode::select(self.etag.is_some(), self.properties.is_some())
    }

    /// Builds the conditional write for this head.
    pub fn operation(&self) -> Result<TableOperation> {
        let mode = self.write_mode();
        TableOperation::for_mode(mode, self.to_row()?).ok_or_else(|| {
            Error::InvalidArgument(format!("{mode:?} of stream head requires a version tag"))
        })
    }
}

// =============================================================================
// Event Record
// =============================================================================

/// An immutable committed event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEntity {
    pub partition: Partition,
    pub version: i64,
    pub properties: Properties,
}

impl EventEntity {
    pub fn new(partition: Partition, version: i64, properties: Properties) -> Self {
        Self {
            partition,
            version,
            properties,
        }
    }

    pub fn row_key(&self) -> String {
        self.partition.event_version_row_key(self.version)
    }

    pub fn to_row(&self) -> Result<TableRow> {
        let mut row = TableRow::new(self.partition.partition_key(), self.row_key())
            .with_property(VERSION_PROPERTY, self.version);
        self.properties.write_to(&mut row.properties, &FIXED_PROPERTIES)?;
        Ok(row)
    }

    pub fn from_row(partition: &Partition, row: &TableRow) -> Result<Self> {
        Ok(Self {
            partition: partition.clone(),
            version: read_version(row)?,
            properties: Properties::from_bag(&row.properties, &FIXED_PROPERTIES),
        })
    }

    /// Event records are only ever inserted.
    pub fn operation(&self) -> Result<TableOperation> {
        Ok(TableOperation::Insert(self.to_row()?))
    }
}

// =============================================================================
// Dedup Marker
// =============================================================================

/// A claim that event `id` was committed at `version`.
///
/// Inserting the marker fails if the id was claimed before, which is how a
/// duplicate append is detected inside the same atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EventIdEntity {
    pub partition: Partition,
    pub id: String,
    pub version: i64,
}

impl EventIdEntity {
    pub fn new(partition: Partition, id: impl Into<String>, version: i64) -> Self {
        Self {
            partition,
            id: id.into(),
            version,
        }
    }

    pub fn row_key(&self) -> String {
        self.partition.event_id_row_key(&self.id)
    }

    pub fn to_row(&self) -> TableRow {
        TableRow::new(self.partition.partition_key(), self.row_key())
            .with_property(VERSION_PROPERTY, self.version)
    }

    pub fn from_row(partition: &Partition, row: &TableRow) -> Result<Self> {
        let id = row
            .row_key
            .strip_prefix(partition.row_key_prefix())
            .and_then(|rest| rest.strip_prefix(EVENT_ID_ROW_KEY_PREFIX))
            .ok_or_else(|| malformed(row, "row key is not a dedup marker key"))?;

        Ok(Self {
            partition: partition.clone(),
            id: id.to_string(),
            version: read_version(row)?,
        })
    }

    pub fn operation(&self) -> TableOperation {
        TableOperation::Insert(self.to_row())
    }
}

// =============================================================================
// Tagged Row Kinds
// =============================================================================

/// Any row this crate writes into a stream's partition.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Head(StreamEntity),
    Event(EventEntity),
    DedupMarker(EventIdEntity),
}

impl Entity {
    /// Parses a stored row, choosing the kind by its row-key prefix.
    pub fn from_row(partition: &Partition, row: &TableRow) -> Result<Self> {
        match RowKind::classify(partition.row_key_prefix(), &row.row_key) {
            Some(RowKind::Head) => Ok(Entity::Head(StreamEntity::from_row(partition, row)?)),
            Some(RowKind::Event) => Ok(Entity::Event(EventEntity::from_row(partition, row)?)),
            Some(RowKind::DedupMarker) => {
                Ok(Entity::DedupMarker(EventIdEntity::from_row(partition, row)?))
            }
            None => Err(malformed(row, "row key does not belong to this stream")),
        }
    }

    pub fn kind(&self) -> RowKind {
        match self {
            Entity::Head(_) => RowKind::Head,
            Entity::Event(_) => RowKind::Event,
            Entity::DedupMarker(_) => RowKind::DedupMarker,
        }
    }

    pub fn to_row(&self) -> Result<TableRow> {
        match self {
            Entity::Head(head) => head.to_row(),
            Entity::Event(event) => event.to_row(),
            Entity::DedupMarker(marker) => Ok(marker.to_row()),
        }
    }
}

fn read_version(row: &TableRow) -> Result<i64> {
    match row.get(VERSION_PROPERTY) {
        Some(PropertyValue::Int64(version)) => Ok(*version),
        Some(other) => Err(malformed(
            row,
            &format!("'{VERSION_PROPERTY}' is {} instead of Int64", other.type_name()),
        )),
        None => Err(malformed(row, &format!("missing '{VERSION_PROPERTY}'"))),
    }
}

fn malformed(row: &TableRow, reason: &str) -> Error {
    Error::MalformedRow {
        row_key: row.row_key.clone(),
        reason: reason.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================
