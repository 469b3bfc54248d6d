//! # Streams
//!
//! [`Stream`] is the caller-facing value object for one logical stream: its
//! address, the version tag last seen, its version, and its head metadata.
//! The associated functions run the synchronous store round trips:
//!
//! ```text
//! provision ──► Insert head
//! write ──────► [head Insert|Merge] + N × event Insert + M × marker Insert
//! set_properties ► Replace head
//! open / try_open / exists ► point read of the head
//! read ───────► point read of the head + range read of event rows
//! ```
//!
//! ## Single Writer Per Stream
//!
//! Every write carries the version tag read earlier. If another writer got
//! there first, the store refuses the head write and the whole batch is
//! discarded; the caller sees [`Error::ConcurrencyConflict`]. Nothing here
//! retries, waits or locks.
//!
//! ## Batch Ceiling
//!
//! One append must fit in one store batch. With ids on every event that is
//! `(max_batch_size - 1) / 2` events. Larger appends are refused with
//! [`Error::BatchTooLarge`]; callers split them into sequential writes, each
//! starting from the stream returned by the previous one.

use tracing::debug;

use crate::batch::{self, AppendBatch};
use crate::entity::{EventEntity, EventIdEntity, StreamEntity};
use crate::error::{Error, Result};
use crate::event::{EventData, RecordedEvent};
use crate::operation::TableOperation;
use crate::partition::Partition;
use crate::property::Properties;
use crate::row::TableRow;
use crate::store::TableStore;

/// The state of one logical stream as last seen by this caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub partition: Partition,

    /// Version tag of the head; `None` until the stream is persisted.
    pub etag: Option<String>,

    /// Version of the last event; 0 for an empty stream.
    pub version: i64,

    /// Head metadata.
    pub properties: Properties,
}

/// Outcome of a successful [`Stream::write`].
#[derive(Debug, Clone)]
pub struct StreamWriteResult {
    /// The stream after the write, ready for the next one.
    pub stream: Stream,

    /// The appended events with their versions.
    pub events: Vec<RecordedEvent>,
}

/// A contiguous run of events read from a stream.
#[derive(Debug, Clone)]
pub struct StreamSlice {
    pub stream: Stream,
    pub events: Vec<RecordedEvent>,

    /// True when the slice reaches the stream's current version.
    pub is_end_of_stream: bool,
}

impl Stream {
    /// A new, not yet persisted stream.
    pub fn new(partition: Partition) -> Self {
        Self::with_properties(partition, Properties::new())
    }

    /// A new, not yet persisted stream with head metadata.
    pub fn with_properties(partition: Partition, properties: Properties) -> Self {
        Self {
            partition,
            etag: None,
            version: 0,
            properties,
        }
    }

    /// True if this stream has never been persisted.
    pub fn is_transient(&self) -> bool {
        self.etag.is_none()
    }

    fn from_head(head: StreamEntity) -> Self {
        Self {
            partition: head.partition,
            etag: head.etag,
            version: head.version,
            properties: head.properties.unwrap_or_default(),
        }
    }

    // =========================================================================
    // Head Lifecycle
    // =========================================================================

    /// Creates the stream head without any events.
    ///
    /// # Errors
    ///
    /// - [`Error::StreamAlreadyExists`] if the head is already there
    /// - [`Error::InvalidArgument`] if `stream` was already persisted
    pub fn provision<S: TableStore + ?Sized>(store: &S, stream: &Stream) -> Result<Stream> {
        if !stream.is_transient() {
            return Err(Error::InvalidArgument(format!(
                "stream '{}' is already persisted",
                stream.partition
            )));
        }

        let head = StreamEntity::new(
            stream.partition.clone(),
            None,
            stream.version,
            Some(stream.properties.clone()),
        );
        let written = submit_head(store, &stream.partition, head.operation()?)?;

        debug!(partition = %stream.partition, "provisioned stream");
        Ok(Stream {
            etag: written.etag,
            ..stream.clone()
        })
    }

    /// Opens an existing stream.
    ///
    /// # Errors
    ///
    /// [`Error::StreamNotFound`] if the stream has no head.
    pub fn open<S: TableStore + ?Sized>(store: &S, partition: &Partition) -> Result<Stream> {
        Self::try_open(store, partition)?.ok_or_else(|| Error::StreamNotFound {
            partition: partition.key().to_string(),
        })
    }

    /// Opens a stream, or returns `None` if it does not exist.
    pub fn try_open<S: TableStore + ?Sized>(
        store: &S,
        partition: &Partition,
    ) -> Result<Option<Stream>> {
        Ok(read_head(store, partition)?.map(Self::from_head))
    }

    /// Checks whether the stream head exists.
    pub fn exists<S: TableStore + ?Sized>(store: &S, partition: &Partition) -> Result<bool> {
        Ok(store
            .retrieve(partition.partition_key(), partition.stream_row_key())?
            .is_some())
    }

    /// Replaces the head metadata of a persisted stream.
    ///
    /// The version is left as is. Stored properties not in `properties` are
    /// removed.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `stream` was never persisted
    /// - [`Error::ConcurrencyConflict`] if the stream changed since it was read
    pub fn set_properties<S: TableStore + ?Sized>(
        store: &S,
        stream: &Stream,
        properties: Properties,
    ) -> Result<Stream> {
        if stream.is_transient() {
            return Err(Error::InvalidArgument(format!(
                "cannot set properties of stream '{}' before it is provisioned",
                stream.partition
            )));
        }

        let head = StreamEntity::new(
            stream.partition.clone(),
            stream.etag.clone(),
            stream.version,
            Some(properties.clone()),
        );
        let written = submit_head(store, &stream.partition, head.operation()?)?;

        Ok(Stream {
            partition: stream.partition.clone(),
            etag: written.etag,
            version: stream.version,
            properties,
        })
    }

    // =========================================================================
    // Append
    // =========================================================================

    /// Appends `events` after `stream.version` in one atomic batch.
    ///
    /// A persisted head is merged, so metadata set with
    /// [`Stream::set_properties`] survives. A transient stream is created
    /// together with its first events.
    ///
    /// # Errors
    ///
    /// - [`Error::ConcurrencyConflict`] if another writer advanced the stream
    /// - [`Error::StreamAlreadyExists`] if `stream` is transient but exists
    /// - [`Error::DuplicateEvent`] if an event id was appended before
    /// - [`Error::BatchTooLarge`] if the append does not fit in one batch
    pub fn write<S: TableStore + ?Sized>(
        store: &S,
        stream: &Stream,
        events: &[EventData],
    ) -> Result<StreamWriteResult> {
        // Only a brand-new head carries metadata on append; a persisted one is merged.
        let head_properties = (stream.is_transient() && !stream.properties.is_empty())
            .then(|| stream.properties.clone());

        let batch = AppendBatch::build(
            &stream.partition,
            stream.etag.clone(),
            stream.version,
            head_properties,
            events,
        )?;
        batch.ensure_fits(store.max_batch_size())?;

        let partition_key = stream.partition.partition_key();
        let written = match store.execute_batch(partition_key, batch.operations().to_vec()) {
            Ok(written) => written,
            Err(err) => {
                let err = batch.translate_conflict(err);
                debug!(partition = %stream.partition, error = %err, "append rejected");
                return Err(err);
            }
        };

        let etag = written
            .first()
            .and_then(|head| head.etag.clone())
            .ok_or_else(|| Error::MalformedRow {
                row_key: stream.partition.stream_row_key().to_string(),
                reason: "store returned no version tag for the head".to_string(),
            })?;

        let version = batch.last_version();
        debug!(
            partition = %stream.partition,
            operations = batch.len(),
            version,
            "appended events"
        );

        let (_, events) = batch.into_parts();
        Ok(StreamWriteResult {
            stream: Stream {
                partition: stream.partition.clone(),
                etag: Some(etag),
                version,
                properties: stream.properties.clone(),
            },
            events,
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Reads up to `slice_size` events starting at `start_version`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `start_version < 1` or `slice_size < 1`
    /// - [`Error::StreamNotFound`] if the stream has no head
    pub fn read<S: TableStore + ?Sized>(
        store: &S,
        partition: &Partition,
        start_version: i64,
        slice_size: usize,
    ) -> Result<StreamSlice> {
        if start_version < 1 {
            return Err(Error::InvalidArgument(format!(
                "start version must be at least 1, got {start_version}"
            )));
        }
        if slice_size == 0 {
            return Err(Error::InvalidArgument("slice size must be at least 1".to_string()));
        }

        let stream = Self::open(store, partition)?;
        if start_version > stream.version {
            return Ok(StreamSlice {
                stream,
                events: Vec::new(),
                is_end_of_stream: true,
            });
        }

        let slice_size = i64::try_from(slice_size).unwrap_or(i64::MAX);
        let end_version = start_version
            .saturating_add(slice_size - 1)
            .min(stream.version);

        let rows = store.query_range(
            partition.partition_key(),
            &partition.event_version_row_key(start_version),
            &partition.event_version_row_key(end_version),
        )?;

        let events = rows
            .iter()
            .map(|row| {
                EventEntity::from_row(partition, row).map(|event| RecordedEvent {
                    id: None,
                    version: event.version,
                    properties: event.properties,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(StreamSlice {
            is_end_of_stream: end_version >= stream.version,
            stream,
            events,
        })
    }

    /// Returns the version at which event `id` was committed, if it was.
    pub fn event_version<S: TableStore + ?Sized>(
        store: &S,
        partition: &Partition,
        id: &str,
    ) -> Result<Option<i64>> {
        let row = store.retrieve(partition.partition_key(), &partition.event_id_row_key(id))?;
        row.map(|row| EventIdEntity::from_row(partition, &row).map(|marker| marker.version))
            .transpose()
    }
}

fn read_head<S: TableStore + ?Sized>(
    store: &S,
    partition: &Partition,
) -> Result<Option<StreamEntity>> {
    store
        .retrieve(partition.partition_key(), partition.stream_row_key())?
        .map(|row| StreamEntity::from_row(partition, &row))
        .transpose()
}

/// Submits a head-only batch and translates any conflict.
fn submit_head<S: TableStore + ?Sized>(
    store: &S,
    partition: &Partition,
    op: TableOperation,
) -> Result<TableRow> {
    let written = store
        .execute_batch(partition.partition_key(), vec![op])
        .map_err(|err| batch::translate_conflict(partition, err, |_| None))?;

    written.into_iter().next().ok_or_else(|| Error::MalformedRow {
        row_key: partition.stream_row_key().to_string(),
        reason: "store returned no row for the head write".to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
