//! Cache management for Tarn.
//!
//! This module provides the `TableCache` struct which manages the row stores of
//! every mirrored table.

use crate::mutation::{AffectedKeys, Mutation};
use crate::row_store::RowStore;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use tarn_core::schema::Table;
use tarn_core::{Error, Result, Row, Value};

/// Cache for managing multiple table stores.
#[derive(Default)]
pub struct TableCache {
    /// Table name → RowStore mapping.
    tables: BTreeMap<String, RowStore>,
}

impl TableCache {
    /// Creates a new empty table cache.
    pub fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
        }
    }

    /// Creates a table in the cache.
    pub fn create_table(&mut self, schema: Table) -> Result<()> {
        let name = schema.name().to_string();
        if self.tables.contains_key(&name) {
            return Err(Error::invalid_schema(format!(
                "Table already exists: {}",
                name
            )));
        }
        self.tables.insert(name, RowStore::new(schema));
        Ok(())
    }

    /// Gets a reference to a table store.
    pub fn get_table(&self, name: &str) -> Option<&RowStore> {
        self.tables.get(name)
    }

    /// Gets a mutable reference to a table store.
    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut RowStore> {
        self.tables.get_mut(name)
    }

    /// Gets a table store, failing with `TableNotFound`.
    pub fn table(&self, name: &str) -> Result<&RowStore> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::table_not_found(name))
    }

    /// Gets a mutable table store, failing with `TableNotFound`.
    pub fn table_mut(&mut self, name: &str) -> Result<&mut RowStore> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::table_not_found(name))
    }

    /// Applies a mutation to the named table.
    pub fn apply(&mut self, table: &str, mutation: &Mutation) -> Result<AffectedKeys> {
        self.table_mut(table)?.apply(mutation)
    }

    /// Gets a row by table name and primary key.
    pub fn get_row(&self, table: &str, key: &Value) -> Option<Arc<Row>> {
        self.tables.get(table).and_then(|t| t.get(key))
    }

    /// Checks if a table exists.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Returns the number of tables.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Returns all table names.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(|s| s.as_str()).collect()
    }

    /// Returns the total row count across all tables.
    pub fn total_row_count(&self) -> usize {
        self.tables.values().map(|t| t.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use tarn_core::schema::TableBuilder;
    use tarn_core::DataType;

    fn schema(name: &str) -> Table {
        TableBuilder::new(name)
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("name", DataType::String)
            .unwrap()
            .primary_key("id")
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_create_table() {
        let mut cache = TableCache::new();
        cache.create_table(schema("tasks")).unwrap();
        assert!(cache.has_table("tasks"));
        assert_eq!(cache.table_count(), 1);
        assert!(cache.create_table(schema("tasks")).is_err());
    }

    #[test]
    fn test_apply_routes_by_table() {
        let mut cache = TableCache::new();
        cache.create_table(schema("tasks")).unwrap();
        cache.create_table(schema("tags")).unwrap();

        let row = Row::new(Value::Int64(1), vec![Value::Int64(1), Value::String("a".into())]);
        let affected = cache.apply("tasks", &Mutation::Insert(row)).unwrap();
        assert_eq!(affected.table, "tasks");
        assert!(cache.get_row("tasks", &Value::Int64(1)).is_some());
        assert!(cache.get_row("tags", &Value::Int64(1)).is_none());
        assert_eq!(cache.total_row_count(), 1);
        assert_eq!(cache.table_names(), vec!["tags", "tasks"]);
    }

    #[test]
    fn test_apply_unknown_table() {
        let mut cache = TableCache::new();
        let err = cache.apply("nope", &Mutation::delete(1i64)).unwrap_err();
        assert_eq!(err, Error::table_not_found("nope"));
    }
}
