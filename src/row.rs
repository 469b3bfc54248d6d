//! # Store Rows
//!
//! [`TableRow`] is the store's generic row: two keys, an optional version tag,
//! an optional store timestamp, and a flat property bag. Entities convert to
//! and from it; the store only ever sees this shape.

use chrono::{DateTime, Utc};

use crate::property::{PropertyMap, PropertyValue};

/// A generic row as exchanged with the table store.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    /// Physical partition key.
    pub partition_key: String,

    /// Row key, unique within the partition.
    pub row_key: String,

    /// Opaque version tag issued by the store; `None` for rows never persisted.
    pub etag: Option<String>,

    /// Last-modified time set by the store.
    pub timestamp: Option<DateTime<Utc>>,

    /// Every non-key property of the row.
    pub properties: PropertyMap,
}

impl TableRow {
    /// Creates a transient row (no tag, no timestamp) with an empty bag.
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            etag: None,
            timestamp: None,
            properties: PropertyMap::new(),
        }
    }

    /// Adds a property (builder pattern).
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_row_is_transient() {
        let row = TableRow::new("p", "SS-HEAD").with_property("Version", 0i64);
        assert_eq!(row.partition_key, "p");
        assert_eq!(row.row_key, "SS-HEAD");
        assert!(row.etag.is_none());
        assert!(row.timestamp.is_none());
        assert_eq!(row.get("Version"), Some(&PropertyValue::Int64(0)));
    }
}
