//! # Async API
//!
//! [`StreamClient`] wraps a [`TableStore`] for use from async code. Store
//! calls are blocking (SQLite I/O, mutexes), so each one is moved onto
//! Tokio's blocking thread pool instead of stalling the async workers:
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ async tasks                  │
//! │  client.write(..).await ─────┼──► spawn_blocking ──► Stream::write(&*store, ..)
//! │  client.read(..).await  ─────┼──► spawn_blocking ──► Stream::read(&*store, ..)
//! └──────────────────────────────┘
//! ```
//!
//! The client is `Clone`; all clones share the same store through an `Arc`.
//! It adds no state of its own, so its errors and conflict semantics are the
//! same as the synchronous [`Stream`] functions.

use std::sync::Arc;

use tokio::task;

use crate::error::Result;
use crate::event::EventData;
use crate::partition::Partition;
use crate::property::Properties;
use crate::store::TableStore;
use crate::stream::{Stream, StreamSlice, StreamWriteResult};

/// Cloneable async handle over a shared table store.
///
/// # Example
///
/// ```rust,no_run
/// use tablestream::{EventData, MemoryStore, Partition, Properties, Stream, StreamClient};
///
/// # async fn example() -> tablestream::Result<()> {
/// let client = StreamClient::new(MemoryStore::new());
/// let partition = Partition::new("account-42")?;
///
/// let result = client
///     .write(
///         Stream::new(partition.clone()),
///         vec![EventData::with_id("deposit-1", Properties::new().with("Amount", 100i64))],
///     )
///     .await?;
/// assert_eq!(result.stream.version, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StreamClient<S> {
    store: Arc<S>,
}

impl<S> Clone for StreamClient<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: TableStore + 'static> StreamClient<S> {
    pub fn new(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }

    pub fn from_arc(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store, for synchronous use.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Runs a blocking store call on Tokio's blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        task::spawn_blocking(move || f(&store)).await?
    }

    /// See [`Stream::provision`].
    pub async fn provision(&self, stream: Stream) -> Result<Stream> {
        self.run(move |store| Stream::provision(store, &stream)).await
    }

    /// See [`Stream::open`].
    pub async fn open(&self, partition: Partition) -> Result<Stream> {
        self.run(move |store| Stream::open(store, &partition)).await
    }

    /// See [`Stream::try_open`].
    pub async fn try_open(&self, partition: Partition) -> Result<Option<Stream>> {
        self.run(move |store| Stream::try_open(store, &partition)).await
    }

    /// See [`Stream::exists`].
    pub async fn exists(&self, partition: Partition) -> Result<bool> {
        self.run(move |store| Stream::exists(store, &partition)).await
    }

    /// See [`Stream::write`].
    pub async fn write(&self, stream: Stream, events: Vec<EventData>) -> Result<StreamWriteResult> {
        self.run(move |store| Stream::write(store, &stream, &events)).await
    }

    /// See [`Stream::set_properties`].
    pub async fn set_properties(&self, stream: Stream, properties: Properties) -> Result<Stream> {
        self.run(move |store| Stream::set_properties(store, &stream, properties))
            .await
    }

    /// See [`Stream::read`].
    pub async fn read(
        &self,
        partition: Partition,
        start_version: i64,
        slice_size: usize,
    ) -> Result<StreamSlice> {
        self.run(move |store| Stream::read(store, &partition, start_version, slice_size))
            .await
    }

    /// See [`Stream::event_version`].
    pub async fn event_version(&self, partition: Partition, id: String) -> Result<Option<i64>> {
        self.run(move |store| Stream::event_version(store, &partition, &id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::Error;

    #[tokio::test]
    async fn test_client_round_trip() {
        let client = StreamClient::new(MemoryStore::new());
        let partition = Partition::new("acc").unwrap();

        let stream = client.provision(Stream::new(partition.clone())).await.unwrap();
        let result = client
            .write(stream, vec![EventData::with_id("e1", Properties::new())])
            .await
            .unwrap();
        assert_eq!(result.stream.version, 1);

        let slice = client.read(partition.clone(), 1, 10).await.unwrap();
        assert_eq!(slice.events.len(), 1);
        assert!(client.exists(partition.clone()).await.unwrap());
        assert_eq!(
            client.event_version(partition, "e1".to_string()).await.unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_clones_share_store() {
        let client = StreamClient::new(MemoryStore::new());
        let other = client.clone();
        let partition = Partition::new("acc").unwrap();

        client.provision(Stream::new(partition.clone())).await.unwrap();
        let err = other.provision(Stream::new(partition)).await.unwrap_err();
        assert!(matches!(err, Error::StreamAlreadyExists { .. }));
    }
}
