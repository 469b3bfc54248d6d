#![allow(dead_code)]

use std::path::PathBuf;

use tablestream::{EventData, Properties, SqliteStore, TableRow, TableStore};

pub fn create_temp_store(name: &str) -> (tempfile::TempDir, PathBuf, SqliteStore) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    let store = SqliteStore::open(&path).expect("open sqlite store");
    (dir, path, store)
}

/// Every row stored in a physical partition, in key order.
pub fn all_rows<S: TableStore + ?Sized>(store: &S, partition_key: &str) -> Vec<TableRow> {
    store
        .query_range(partition_key, "", "~")
        .expect("range query")
}

pub fn identified_events(prefix: &str, n: usize) -> Vec<EventData> {
    (1..=n)
        .map(|i| {
            EventData::with_id(
                format!("{prefix}-{i}"),
                Properties::new().with("Type", "Deposited").with("Amount", i as i64),
            )
        })
        .collect()
}
