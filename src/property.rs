//! # Property Bags
//!
//! The table store is schema-less: every row is a flat bag of named,
//! natively typed values. This module models that bag ([`PropertyMap`]), the
//! primitive types the store understands ([`PropertyValue`]), and the
//! caller-owned subset of a bag ([`Properties`]).
//!
//! ## Fixed vs Custom Properties
//!
//! Each row kind owns a few fixed fields (e.g. `Version`). Everything else in
//! the bag belongs to the caller:
//!
//! ```text
//! bag = { "Version": Int64(3), "Type": String("Shipped"), "Weight": Double(1.5) }
//!         └── fixed ───────┘   └──────────── custom (Properties) ────────────┘
//! ```
//!
//! Custom names that collide with a fixed field are rejected on write with
//! [`Error::ReservedProperty`] rather than letting the last write win.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Names the store itself manages on every row. Never valid as custom names.
pub const SYSTEM_PROPERTIES: [&str; 4] = ["PartitionKey", "RowKey", "Timestamp", "ETag"];

// =============================================================================
// Property Values
// =============================================================================

/// A single natively typed value in a row's property bag.
///
/// # Rust Pattern: Closed Enum
///
/// The store supports a fixed set of primitive types, so the set of variants
/// is closed. Matching on it is exhaustive, and adding a type later is a
/// compile error everywhere it needs handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    String(String),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Binary(Vec<u8>),
    Guid(Uuid),
}

impl PropertyValue {
    /// Returns the value as an `i64` if it is an `Int64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a string slice if it is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the native type, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => "String",
            PropertyValue::Int32(_) => "Int32",
            PropertyValue::Int64(_) => "Int64",
            PropertyValue::Double(_) => "Double",
            PropertyValue::Boolean(_) => "Boolean",
            PropertyValue::DateTime(_) => "DateTime",
            PropertyValue::Binary(_) => "Binary",
            PropertyValue::Guid(_) => "Guid",
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int32(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int64(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Boolean(v)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(v: DateTime<Utc>) -> Self {
        PropertyValue::DateTime(v)
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(v: Vec<u8>) -> Self {
        PropertyValue::Binary(v)
    }
}

impl From<Uuid> for PropertyValue {
    fn from(v: Uuid) -> Self {
        PropertyValue::Guid(v)
    }
}

/// The store's generic flat property bag.
///
/// `BTreeMap` keeps serialization deterministic, which makes stored JSON and
/// test assertions stable.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

// =============================================================================
// Custom Properties
// =============================================================================

/// A caller-defined set of properties attached to a stream head or event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(PropertyMap);

impl Properties {
    /// Creates an empty property set.
    pub fn new() -> Self {
        Self(PropertyMap::new())
    }

    /// Adds a property (builder pattern).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Inserts or overwrites a property.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Looks up a property by name.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    /// Reconstructs the custom set from a stored bag by dropping fixed fields.
    pub fn from_bag(bag: &PropertyMap, fixed: &[&str]) -> Self {
        let custom = bag
            .iter()
            .filter(|(name, _)| !is_reserved(name, fixed))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Self(custom)
    }

    /// Merges every custom property into `bag` under its own name.
    ///
    /// # Errors
    ///
    /// - [`Error::ReservedProperty`] if a name matches a fixed field or a
    ///   store-managed name
    /// - [`Error::InvalidProperty`] for a non-finite `Double`
    ///
    /// The bag is left untouched on error.
    pub fn write_to(&self, bag: &mut PropertyMap, fixed: &[&str]) -> Result<()> {
        for (name, value) in &self.0 {
            if is_reserved(name, fixed) {
                return Err(Error::ReservedProperty { name: name.clone() });
            }
            if let PropertyValue::Double(v) = value {
                if !v.is_finite() {
                    return Err(Error::InvalidProperty {
                        name: name.clone(),
                        reason: format!("Double value {v} is not finite"),
                    });
                }
            }
        }
        for (name, value) in &self.0 {
            bag.insert(name.clone(), value.clone());
        }
        Ok(())
    }
}

impl FromIterator<(String, PropertyValue)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<PropertyMap> for Properties {
    fn from(map: PropertyMap) -> Self {
        Self(map)
    }
}

fn is_reserved(name: &str, fixed: &[&str]) -> bool {
    fixed.contains(&name) || SYSTEM_PROPERTIES.contains(&name)
}

// =============================================================================
// Tests
// =============================================================================
