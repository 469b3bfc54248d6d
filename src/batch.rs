//! # Append Batches
//!
//! An [`AppendBatch`] is the complete, not-yet-submitted set of row writes
//! for one append:
//!
//! ```text
//! head write          Insert | Merge (tag) | Replace (tag)     1 op
//! event records       Insert SS-SE-<v>                        N ops
//! dedup markers       Insert SS-UID-<id>        (events with ids only)
//! ```
//!
//! Building it is pure. Submitting it is the store's job, as one atomic
//! batch. When the store refuses a row, [`AppendBatch::translate_conflict`]
//! turns the raw [`Error::TableConflict`] into the error the caller cares
//! about, using the kind of the failing row.
//!
//! ## Marker → Event Lookup
//!
//! Dedup markers only store a version. To report *which* event was a
//! duplicate, the batch keeps a map from marker row key to the event it was
//! built for. The map lives as long as the batch and is never persisted.

use std::collections::HashMap;

use crate::entity::{EventEntity, EventIdEntity, StreamEntity};
use crate::error::{ConflictKind, Error, Result};
use crate::event::{EventData, RecordedEvent};
use crate::keys::RowKind;
use crate::operation::TableOperation;
use crate::partition::Partition;
use crate::property::Properties;

/// Row writes for one append, in submission order.
#[derive(Debug, Clone)]
pub struct AppendBatch {
    partition: Partition,
    head: StreamEntity,
    operations: Vec<TableOperation>,
    events: Vec<RecordedEvent>,
    markers: HashMap<String, usize>,
}

impl AppendBatch {
    /// Builds the writes that append `events` after `version`.
    ///
    /// `etag` is the head's held version tag (`None` for a new stream) and
    /// `head_properties` the property payload to write with the head, if any.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for an empty append or an id used twice
    ///   in the same append
    /// - [`Error::InvalidArgument`] if the last version would overflow `i64`
    /// - [`Error::ReservedProperty`] for a custom name that shadows a fixed field
    pub fn build(
        partition: &Partition,
        etag: Option<String>,
        version: i64,
        head_properties: Option<Properties>,
        events: &[EventData],
    ) -> Result<Self> {
        if events.is_empty() {
            return Err(Error::InvalidArgument(
                "an append must contain at least one event".to_string(),
            ));
        }

        let last_version = i64::try_from(events.len())
            .ok()
            .and_then(|count| version.checked_add(count))
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "appending {} events after version {version} overflows the version range",
                    events.len()
                ))
            })?;

        let recorded: Vec<RecordedEvent> = events
            .iter()
            .zip(version + 1..=last_version)
            .map(|(event, v)| event.record(v))
            .collect();

        let head = StreamEntity::new(partition.clone(), etag, last_version, head_properties);
        let mut operations = Vec::with_capacity(1 + recorded.len() * 2);
        operations.push(head.operation()?);

        let mut markers = HashMap::new();
        for (index, event) in recorded.iter().enumerate() {
            let record = EventEntity::new(partition.clone(), event.version, event.properties.clone());
            operations.push(record.operation()?);

            if let Some(id) = &event.id {
                let marker = EventIdEntity::new(partition.clone(), id.as_str(), event.version);
                if markers.insert(marker.row_key(), index).is_some() {
                    return Err(Error::InvalidArgument(format!(
                        "event id '{id}' appears more than once in the append"
                    )));
                }
                operations.push(marker.operation());
            }
        }

        Ok(Self {
            partition: partition.clone(),
            head,
            operations,
            events: recorded,
            markers,
        })
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// The head entity as it will be written.
    pub fn head(&self) -> &StreamEntity {
        &self.head
    }

    pub fn operations(&self) -> &[TableOperation] {
        &self.operations
    }

    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    /// Number of store operations the batch needs.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Version of the last event in the batch.
    pub fn last_version(&self) -> i64 {
        self.head.version
    }

    /// Fails with [`Error::BatchTooLarge`] if the batch exceeds `max`.
    pub fn ensure_fits(&self, max: usize) -> Result<()> {
        if self.operations.len() > max {
            return Err(Error::BatchTooLarge {
                operations: self.operations.len(),
                max,
            });
        }
        Ok(())
    }

    /// Splits the batch into its parts for submission.
    pub fn into_parts(self) -> (Vec<TableOperation>, Vec<RecordedEvent>) {
        (self.operations, self.events)
    }

    /// The event whose dedup marker has `row_key`, if it belongs to this batch.
    pub fn event_for_marker(&self, row_key: &str) -> Option<&RecordedEvent> {
        self.markers.get(row_key).map(|&index| &self.events[index])
    }

    /// Maps a raw store conflict onto the caller-facing conflict kind.
    ///
    /// | failing row  | store says          | caller sees            |
    /// |--------------|---------------------|------------------------|
    /// | head         | already exists      | `StreamAlreadyExists`  |
    /// | head         | precondition failed | `ConcurrencyConflict`  |
    /// | event record | already exists      | `ConcurrencyConflict`  |
    /// | dedup marker | already exists      | `DuplicateEvent`       |
    ///
    /// Every other error passes through unchanged.
    pub fn translate_conflict(&self, err: Error) -> Error {
        translate_conflict(&self.partition, err, |row_key| self.event_for_marker(row_key))
    }
}

/// Conflict translation shared by appends and head-only writes.
pub(crate) fn translate_conflict<'a>(
    partition: &Partition,
    err: Error,
    event_for_marker: impl Fn(&str) -> Option<&'a RecordedEvent>,
) -> Error {
    let Error::TableConflict { row_key, kind } = err else {
        return err;
    };
    let key = partition.key().to_string();

    match (RowKind::classify(partition.row_key_prefix(), &row_key), kind) {
        (Some(RowKind::Head), ConflictKind::AlreadyExists) => {
            Error::StreamAlreadyExists { partition: key }
        }
        (Some(RowKind::DedupMarker), ConflictKind::AlreadyExists) => match event_for_marker(&row_key) {
            Some(event) => Error::DuplicateEvent {
                partition: key,
                id: event.id.as_ref().map(|id| id.to_string()).unwrap_or_default(),
                version: event.version,
            },
            None => Error::ConcurrencyConflict {
                partition: key,
                row_key,
            },
        },
        _ => Error::ConcurrencyConflict {
            partition: key,
            row_key,
        },
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventId;
    use crate::operation::WriteMode;

    fn partition() -> Partition {
        Partition::new("acc-1").unwrap()
    }

    fn identified(n: usize) -> Vec<EventData> {
        (1..=n)
            .map(|i| EventData::with_id(format!("e-{i}"), Properties::new().with("N", i as i64)))
            .collect()
    }

    #[test]
    fn test_new_stream_batch_shape() {
        let batch = AppendBatch::build(&partition(), None, 0, None, &identified(5)).unwrap();

        assert_eq!(batch.len(), 11);
        assert_eq!(batch.last_version(), 5);
        batch.ensure_fits(100).unwrap();

        let ops = batch.operations();
        assert_eq!(ops[0].mode(), WriteMode::Insert);
        assert_eq!(ops[0].row_key(), "SS-HEAD");
        assert!(ops.iter().all(|op| op.mode() == WriteMode::Insert));

        let event_rows = ops
            .iter()
            .filter(|op| RowKind::classify("", op.row_key()) == Some(RowKind::Event))
            .count();
        let marker_rows = ops
            .iter()
            .filter(|op| RowKind::classify("", op.row_key()) == Some(RowKind::DedupMarker))
            .count();
        assert_eq!(event_rows, 5);
        assert_eq!(marker_rows, 5);

        let versions: Vec<i64> = batch.events().iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_existing_stream_merges_head() {
        let batch = AppendBatch::build(&partition(), Some("t".into()), 7, None, &identified(1)).unwrap();
        assert_eq!(batch.operations()[0].mode(), WriteMode::Merge);
        assert_eq!(batch.operations()[0].precondition(), Some("t"));
        assert_eq!(batch.events()[0].version, 8);
        assert_eq!(batch.operations()[1].row_key(), "SS-SE-0000000000000000008");
    }

    #[test]
    fn test_events_without_id_have_no_marker() {
        let events = vec![EventData::new(Properties::new()), EventData::new(Properties::new())];
        let batch = AppendBatch::build(&partition(), None, 0, None, &events).unwrap();
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_rejects_empty_and_repeated_ids() {
        assert!(matches!(
            AppendBatch::build(&partition(), None, 0, None, &[]),
            Err(Error::InvalidArgument(_))
        ));

        let events = vec![
            EventData::with_id("same", Properties::new()),
            EventData::with_id("same", Properties::new()),
        ];
        assert!(matches!(
            AppendBatch::build(&partition(), None, 0, None, &events),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_version_overflow_is_rejected() {
        let err = AppendBatch::build(&partition(), Some("t".into()), i64::MAX, None, &identified(1))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = AppendBatch::build(&partition(), Some("t".into()), i64::MAX - 1, None, &identified(2))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let batch =
            AppendBatch::build(&partition(), Some("t".into()), i64::MAX - 2, None, &identified(2)).unwrap();
        assert_eq!(batch.last_version(), i64::MAX);
    }

    #[test]
    fn test_ensure_fits() {
        let batch = AppendBatch::build(&partition(), None, 0, None, &identified(5)).unwrap();
        assert!(matches!(
            batch.ensure_fits(10),
            Err(Error::BatchTooLarge { operations: 11, max: 10 })
        ));
    }

    #[test]
    fn test_translate_conflicts_by_row_kind() {
        let p = Partition::with_prefix("acc-1", "ledger").unwrap();
        let batch = AppendBatch::build(&p, Some("t".into()), 2, None, &identified(2)).unwrap();
        let raw = |row_key: &str, kind| Error::TableConflict {
            row_key: row_key.to_string(),
            kind,
        };

        let err = batch.translate_conflict(raw("ledger|SS-HEAD", ConflictKind::PreconditionFailed));
        assert!(matches!(err, Error::ConcurrencyConflict { .. }));

        let err = batch.translate_conflict(raw("ledger|SS-HEAD", ConflictKind::AlreadyExists));
        assert!(matches!(err, Error::StreamAlreadyExists { ref partition } if partition == "acc-1|ledger"));

        let err = batch.translate_conflict(raw(
            "ledger|SS-SE-0000000000000000003",
            ConflictKind::AlreadyExists,
        ));
        assert!(matches!(err, Error::ConcurrencyConflict { .. }));

        let err = batch.translate_conflict(raw("ledger|SS-UID-e-2", ConflictKind::AlreadyExists));
        assert!(matches!(
            err,
            Error::DuplicateEvent { ref id, version: 4, .. } if id == "e-2"
        ));

        let err = batch.translate_conflict(Error::InvalidArgument("x".into()));
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_event_for_marker() {
        let batch = AppendBatch::build(&partition(), None, 0, None, &identified(3)).unwrap();
        let event = batch.event_for_marker("SS-UID-e-2").unwrap();
        assert_eq!(event.id, Some(EventId::new("e-2")));
        assert_eq!(event.version, 2);
        assert!(batch.event_for_marker("SS-UID-unknown").is_none());
    }
}
