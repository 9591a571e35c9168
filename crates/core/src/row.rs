//! Row structure for Tarn.
//!
//! This module defines the `Row` struct which represents a single mirrored row.

use crate::value::Value;
use alloc::vec::Vec;

/// Local version number of a row.
pub type Version = u64;

/// A row in a mirrored table.
///
/// The primary key is kept alongside the positional values so that stores and
/// logs can address the row without consulting the schema.
#[derive(Clone, Debug)]
pub struct Row {
    /// Primary key value, unique within the table.
    key: Value,
    /// Version number for change detection. Increased on every applied mutation.
    version: Version,
    /// Values stored in this row, indexed by column position.
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row with the given key and values.
    /// Version defaults to 1 for new rows.
    pub fn new(key: Value, values: Vec<Value>) -> Self {
        Self {
            key,
            version: 1,
            values,
        }
    }

    /// Creates a new row with the given key, version, and values.
    pub fn new_with_version(key: Value, version: Version, values: Vec<Value>) -> Self {
        Self {
            key,
            version,
            values,
        }
    }

    /// Returns the primary key.
    #[inline]
    pub fn key(&self) -> &Value {
        &self.key
    }

    /// Returns the version number.
    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Sets the version number.
    #[inline]
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Returns a reference to the values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row and returns its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Gets a value at the given column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Sets a value at the given column index.
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        if index < self.values.len() {
            self.values[index] = value;
            true
        } else {
            false
        }
    }

    /// Returns the number of values in this row.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Rows compare by key and contents; the version is bookkeeping.
impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.values == other.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_row_new() {
        let row = Row::new(Value::Int64(1), vec![Value::Int64(1), Value::String("Alice".into())]);
        assert_eq!(row.key(), &Value::Int64(1));
        assert_eq!(row.version(), 1);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_row_get_set() {
        let mut row = Row::new(Value::Int64(1), vec![Value::Int64(1), Value::Int64(0)]);
        assert!(row.set(1, Value::Int64(1)));
        assert_eq!(row.get(1), Some(&Value::Int64(1)));
        assert!(!row.set(10, Value::Int64(999)));
        assert_eq!(row.get(2), None);
    }

    #[test]
    fn test_row_equality_ignores_version() {
        let row1 = Row::new_with_version(Value::Int64(1), 3, vec![Value::Int64(42)]);
        let row2 = Row::new(Value::Int64(1), vec![Value::Int64(42)]);
        let row3 = Row::new(Value::Int64(2), vec![Value::Int64(42)]);
        assert_eq!(row1, row2);
        assert_ne!(row1, row3);
    }

    #[test]
    fn test_row_version() {
        let mut row = Row::new(Value::Int64(1), vec![Value::Int64(42)]);
        assert_eq!(row.version(), 1);
        row.set_version(10);
        assert_eq!(row.version(), 10);
    }
}
