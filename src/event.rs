//! # Event Types
//!
//! [`EventData`] is what a caller appends; [`RecordedEvent`] is the same
//! event once it has been given a version.

use std::fmt;

use crate::property::Properties;

/// A caller-supplied event identifier used for idempotent appends.
///
/// The identifier is opaque and lands verbatim in a row key, so it must not
/// contain characters the store forbids there.
///
/// # Example
///
/// ```rust
/// use tablestream::EventId;
///
/// let id = EventId::new("order-placed-7f3a");
/// assert_eq!(id.as_str(), "order-placed-7f3a");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An event to be appended.
///
/// Events with an id get a dedup marker; appending the same id to the same
/// stream again fails with [`Error::DuplicateEvent`](crate::Error::DuplicateEvent).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventData {
    pub id: Option<EventId>,
    pub properties: Properties,
}

impl EventData {
    /// An event without an id (no duplicate detection).
    pub fn new(properties: Properties) -> Self {
        Self { id: None, properties }
    }

    /// An event with an id.
    pub fn with_id(id: impl Into<EventId>, properties: Properties) -> Self {
        Self {
            id: Some(id.into()),
            properties,
        }
    }

    pub(crate) fn record(&self, version: i64) -> RecordedEvent {
        RecordedEvent {
            id: self.id.clone(),
            version,
            properties: self.properties.clone(),
        }
    }
}

/// An event with its assigned stream version.
///
/// Ids are not stored on event records, so events returned by
/// [`Stream::read`](crate::Stream::read) have `id: None`. Use
/// [`Stream::event_version`](crate::Stream::event_version) to look an id up.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub id: Option<EventId>,
    pub version: i64,
    pub properties: Properties,
}
