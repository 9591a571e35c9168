//! Column definition for Tarn table schemas.

use crate::types::DataType;
use alloc::string::String;

/// A column definition in a table schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    name: String,
    /// Data type of the column.
    data_type: DataType,
    /// Whether this column allows null values.
    nullable: bool,
    /// Column index in the table (0-based).
    index: usize,
}

impl Column {
    /// Creates a new nullable column definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            index: 0,
        }
    }

    /// Sets whether this column is nullable.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Sets the column index.
    pub(crate) fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Returns the column name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the data type.
    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns whether this column is nullable.
    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Returns the position of this column in its table.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_builder() {
        let col = Column::new("complete", DataType::Int64).nullable(false);
        assert_eq!(col.name(), "complete");
        assert_eq!(col.data_type(), DataType::Int64);
        assert!(!col.is_nullable());
        assert_eq!(col.index(), 0);
    }
}
