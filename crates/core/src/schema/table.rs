//! Table definition for Tarn schemas.

use super::column::Column;
use crate::error::{Error, Result};
use crate::types::DataType;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

/// A table definition: ordered columns and one primary-key column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    /// Table name.
    name: String,
    /// Column definitions.
    columns: Vec<Column>,
    /// Position of the primary-key column.
    primary_key: usize,
}

impl Table {
    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the columns.
    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Gets a column by name.
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Gets a column index by name.
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Gets a column index by name, failing with `ColumnNotFound`.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.get_column_index(name)
            .ok_or_else(|| Error::column_not_found(&self.name, name))
    }

    /// Returns the position of the primary-key column.
    #[inline]
    pub fn primary_key_index(&self) -> usize {
        self.primary_key
    }

    /// Returns the primary-key column.
    pub fn primary_key(&self) -> &Column {
        &self.columns[self.primary_key]
    }

    /// Returns the column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name()).collect()
    }
}

/// Builder for creating table definitions.
pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
    primary_key: Option<String>,
}

impl TableBuilder {
    /// Creates a new table builder.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        Ok(Self {
            name,
            columns: Vec::new(),
            primary_key: None,
        })
    }

    /// Validates a name follows naming rules.
    fn check_naming_rules(name: &str) -> Result<()> {
        let first = match name.chars().next() {
            Some(c) => c,
            None => return Err(Error::invalid_schema("Name cannot be empty")),
        };
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::invalid_schema(format!(
                "Name must start with letter or underscore: {}",
                name
            )));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::invalid_schema(format!(
                "Name contains invalid characters: {}",
                name
            )));
        }
        Ok(())
    }

    /// Adds a nullable column to the table.
    pub fn add_column(self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        self.add(Column::new(name, data_type))
    }

    /// Adds a column definition to the table.
    pub fn add(mut self, column: Column) -> Result<Self> {
        Self::check_naming_rules(column.name())?;
        if self.columns.iter().any(|c| c.name() == column.name()) {
            return Err(Error::invalid_schema(format!(
                "Column already exists: {}",
                column.name()
            )));
        }
        self.columns.push(column);
        Ok(self)
    }

    /// Marks columns as non-nullable.
    pub fn add_not_null(mut self, columns: &[&str]) -> Self {
        for name in columns {
            if let Some(col) = self.columns.iter_mut().find(|c| c.name() == *name) {
                *col = col.clone().nullable(false);
            }
        }
        self
    }

    /// Sets the primary-key column. The column becomes non-nullable.
    pub fn primary_key(mut self, column: &str) -> Result<Self> {
        if self.primary_key.is_some() {
            return Err(Error::invalid_schema(format!(
                "Table {} already has a primary key",
                self.name
            )));
        }
        let col = self
            .columns
            .iter_mut()
            .find(|c| c.name() == column)
            .ok_or_else(|| Error::invalid_schema(format!("Column not found: {}", column)))?;
        *col = col.clone().nullable(false);
        self.primary_key = Some(column.into());
        Ok(self)
    }

    /// Builds the table definition.
    pub fn build(self) -> Result<Table> {
        let pk_name = self.primary_key.ok_or_else(|| {
            Error::invalid_schema(format!("Table {} has no primary key", self.name))
        })?;
        let columns: Vec<Column> = self
            .columns
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.with_index(i))
            .collect();
        let primary_key = columns
            .iter()
            .position(|c| c.name() == pk_name)
            .ok_or_else(|| Error::invalid_schema(format!("Column not found: {}", pk_name)))?;
        Ok(Table {
            name: self.name,
            columns,
            primary_key,
        })
    }
}
