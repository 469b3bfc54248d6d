//! # tablestream - Event Streams on a Partitioned Table Store
//!
//! tablestream stores append-only event streams in a schema-less table store
//! whose only transaction is a batch of writes inside one partition and
//! whose only conflict check is a per-row version tag. It provides:
//!
//! - **Single writer per stream**: racing appends, at most one succeeds
//! - **Idempotent appends**: an event id can be committed once per stream
//! - **Stream head metadata**: custom properties that survive appends
//! - **Virtual partitions**: several streams in one physical partition
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │             StreamClient (async) / Stream (sync)                │
//! │        provision, open, write, set_properties, read             │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        AppendBatch                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐  │
//! │  │  Partition   │  │  Entities    │  │  Head write-mode      │  │
//! │  │  + row keys  │  │  head/event/ │  │  Insert/Merge/Replace │  │
//! │  │              │  │  dedup       │  │                       │  │
//! │  └──────────────┘  └──────────────┘  └───────────────────────┘  │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │  one atomic batch per append
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │          TableStore (MemoryStore, SqliteStore, yours)           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! 1. **Gap-free versions**: event versions start at 1 and increase by 1
//! 2. **Ordered keys**: event row keys sort in version order
//! 3. **One batch per append**: head + events + markers commit together
//! 4. **Conditional head**: every head update carries the last-seen tag
//! 5. **No retries**: conflicts go straight back to the caller
//!
//! ## Module Organization
//!
//! - [`error`]: Error enum and conflict kinds
//! - [`config`]: Store configuration
//! - [`keys`]: Row-key grammar
//! - [`partition`]: Partition addresses
//! - [`property`]: Property bags and values
//! - [`row`]: Generic store rows
//! - [`operation`]: Write operations and the head write-mode selector
//! - [`entity`]: Stream head, event record and dedup marker rows
//! - [`event`]: Caller-facing event types
//! - [`batch`]: Append batch construction and conflict translation
//! - [`store`]: `TableStore` trait and the in-memory store
//! - [`schema`] / [`sqlite`]: The SQLite-backed store
//! - [`stream`]: Synchronous stream operations
//! - [`api`]: Async facade

pub mod api;
pub mod batch;
pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod keys;
pub mod operation;
pub mod partition;
pub mod property;
pub mod row;
pub mod schema;
pub mod sqlite;
pub mod store;
pub mod stream;

// =============================================================================
// Re-exports
// =============================================================================

pub use api::StreamClient;
pub use batch::AppendBatch;
pub use config::TableConfig;
pub use entity::{Entity, EventEntity, EventIdEntity, StreamEntity};
pub use error::{ConflictKind, Error, Result};
pub use event::{EventData, EventId, RecordedEvent};
pub use keys::RowKind;
pub use operation::{TableOperation, WriteMode};
pub use partition::Partition;
pub use property::{Properties, PropertyMap, PropertyValue};
pub use row::TableRow;
pub use sqlite::SqliteStore;
pub use store::{MemoryStore, TableStore};
pub use stream::{Stream, StreamSlice, StreamWriteResult};
