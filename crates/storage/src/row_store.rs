//! Row storage for Tarn.
//!
//! This module provides the `RowStore` struct which holds the mirrored rows of a
//! single table, keyed by primary key and kept in insertion order.

use crate::mutation::{AffectedKeys, ColumnDelta, Mutation};
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::format;
use alloc::string::ToString;
use alloc::sync::Arc;
use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};
use tarn_core::schema::Table;
use tarn_core::{DataType, Error, Result, Row, Value, Version};

/// A stored row and its position in scan order.
struct Slot {
    position: u64,
    row: Arc<Row>,
}

/// Row storage for a single table.
///
/// Rows are shared as `Arc<Row>` so scans hand out a snapshot without copying
/// values. Scan order is insertion order: updates keep a row in place, deletes
/// remove it, and a re-insert of the same key goes to the end.
pub struct RowStore {
    schema: Table,
    rows: HashMap<Value, Slot>,
    order: BTreeMap<u64, Value>,
    next_position: u64,
    /// Next integer key handed out by `next_key`.
    next_key: i64,
    /// Last version handed out. Shared by every row, so a key that is deleted
    /// and inserted again still gets a higher version.
    clock: Version,
}

impl RowStore {
    /// Creates a new row store for the given table schema.
    pub fn new(schema: Table) -> Self {
        Self {
            schema,
            rows: HashMap::new(),
            order: BTreeMap::new(),
            next_position: 0,
            next_key: 1,
            clock: 0,
        }
    }

    /// Returns the table schema.
    pub fn schema(&self) -> &Table {
        &self.schema
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns true if a row with this key exists.
    pub fn contains(&self, key: &Value) -> bool {
        self.rows.contains_key(key)
    }

    /// Gets a row by primary key.
    pub fn get(&self, key: &Value) -> Option<Arc<Row>> {
        self.rows.get(key).map(|slot| slot.row.clone())
    }

    /// Returns an iterator over the rows as of this call, in insertion order.
    ///
    /// The snapshot is taken eagerly (cheap `Arc` clones); later mutations are
    /// not observed by an existing scan.
    pub fn scan(&self) -> Scan {
        let rows: Vec<Arc<Row>> = self
            .order
            .values()
            .filter_map(|key| self.rows.get(key).map(|slot| slot.row.clone()))
            .collect();
        Scan {
            inner: rows.into_iter(),
        }
    }

    /// Returns the primary keys in scan order.
    pub fn keys(&self) -> Vec<Value> {
        self.order.values().cloned().collect()
    }

    /// Allocates a fresh integer primary key above every key seen so far.
    pub fn next_key(&mut self) -> Result<Value> {
        if self.schema.primary_key().data_type() != DataType::Int64 {
            return Err(Error::invalid_operation(format!(
                "Primary key of {} is not an integer and must be provided",
                self.schema.name()
            )));
        }
        let key = self.next_key;
        self.next_key += 1;
        Ok(Value::Int64(key))
    }

    /// Keeps `next_key` above `key` without storing a row, for keys known to
    /// be taken elsewhere.
    pub fn reserve_key(&mut self, key: &Value) {
        if let Value::Int64(k) = key {
            if *k >= self.next_key {
                self.next_key = k.saturating_add(1);
            }
        }
    }

    fn tick(&mut self) -> Version {
        self.clock += 1;
        self.clock
    }

    /// Applies a mutation, returning the affected keys.
    ///
    /// Inserting an existing key fails with `Conflict`; updating or deleting an
    /// absent key fails with `NotFound`. A failed apply changes nothing.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<AffectedKeys> {
        match mutation {
            Mutation::Insert(row) => self.insert(row),
            Mutation::Update { key, changes } => self.update(key, changes),
            Mutation::Delete { key } => self.delete(key),
        }
    }

    fn insert(&mut self, row: &Row) -> Result<AffectedKeys> {
        let values = self.validate_row(row)?;
        let key = row.key().clone();
        if self.rows.contains_key(&key) {
            return Err(Error::conflict(self.schema.name(), key));
        }
        let version = self.tick();
        self.place(key.clone(), version, values);
        Ok(AffectedKeys::rows(self.schema.name(), alloc::vec![key]))
    }

    fn update(&mut self, key: &Value, changes: &[ColumnDelta]) -> Result<AffectedKeys> {
        let current = match self.rows.get(key) {
            Some(slot) => slot.row.clone(),
            None => return Err(Error::not_found(self.schema.name(), key.clone())),
        };

        let mut values = current.values().to_vec();
        let mut columns = BTreeSet::new();
        for delta in changes {
            let idx = self.schema.column_index(&delta.column)?;
            if idx == self.schema.primary_key_index() {
                return Err(Error::invalid_operation(format!(
                    "Cannot update primary key column {}",
                    delta.column
                )));
            }
            values[idx] = self.check_value(idx, delta.value.clone())?;
            columns.insert(delta.column.clone());
        }

        let row = Row::new_with_version(key.clone(), self.tick(), values);
        if let Some(slot) = self.rows.get_mut(key) {
            slot.row = Arc::new(row);
        }
        Ok(AffectedKeys::columns(self.schema.name(), key.clone(), columns))
    }

    fn delete(&mut self, key: &Value) -> Result<AffectedKeys> {
        let slot = self
            .rows
            .remove(key)
            .ok_or_else(|| Error::not_found(self.schema.name(), key.clone()))?;
        self.order.remove(&slot.position);
        Ok(AffectedKeys::rows(self.schema.name(), alloc::vec![key.clone()]))
    }

    /// Inserts the row, or replaces the values of an existing row in place.
    ///
    /// Used for authoritative rows coming from the remote store, which must not
    /// be rejected as duplicates.
    pub fn upsert(&mut self, row: &Row) -> Result<AffectedKeys> {
        let values = self.validate_row(row)?;
        let key = row.key().clone();
        if !self.rows.contains_key(&key) {
            return self.insert(row);
        }
        let version = self.tick();
        if let Some(slot) = self.rows.get_mut(&key) {
            slot.row = Arc::new(Row::new_with_version(key.clone(), version, values));
        }
        Ok(AffectedKeys::rows(self.schema.name(), alloc::vec![key]))
    }

    /// Replaces the whole contents of the store with `rows`.
    ///
    /// All rows are validated before anything is replaced. Every loaded row
    /// gets a version above any it had before.
    pub fn load(&mut self, rows: Vec<Row>) -> Result<AffectedKeys> {
        let mut validated = Vec::with_capacity(rows.len());
        let mut seen = BTreeSet::new();
        for row in &rows {
            let values = self.validate_row(row)?;
            if !seen.insert(row.key().clone()) {
                return Err(Error::conflict(self.schema.name(), row.key().clone()));
            }
            validated.push((row.key().clone(), values));
        }

        let mut keys: Vec<Value> = self.keys();
        let mut listed: HashSet<Value> = keys.iter().cloned().collect();
        self.rows.clear();
        self.order.clear();

        for (key, values) in validated {
            let version = self.tick();
            if listed.insert(key.clone()) {
                keys.push(key.clone());
            }
            self.place(key, version, values);
        }
        Ok(AffectedKeys::rows(self.schema.name(), keys))
    }

    fn place(&mut self, key: Value, version: Version, values: Vec<Value>) {
        if let Value::Int64(k) = key {
            if k >= self.next_key {
                self.next_key = k.saturating_add(1);
            }
        }
        let position = self.next_position;
        self.next_position += 1;
        self.order.insert(position, key.clone());
        let row = Arc::new(Row::new_with_version(key.clone(), version, values));
        self.rows.insert(key, Slot { position, row });
    }

    /// Checks arity, types and nullability; returns the coerced values.
    fn validate_row(&self, row: &Row) -> Result<Vec<Value>> {
        let columns = self.schema.columns();
        if row.len() != columns.len() {
            return Err(Error::invalid_operation(format!(
                "Table {} expects {} values, got {}",
                self.schema.name(),
                columns.len(),
                row.len()
            )));
        }
        let pk = self.schema.primary_key_index();
        if row.get(pk) != Some(row.key()) {
            return Err(Error::invalid_operation(format!(
                "Row key {} does not match primary key column {}",
                row.key(),
                self.schema.primary_key().name()
            )));
        }
        row.values()
            .iter()
            .enumerate()
            .map(|(idx, v)| self.check_value(idx, v.clone()))
            .collect()
    }

    fn check_value(&self, idx: usize, value: Value) -> Result<Value> {
        let column = &self.schema.columns()[idx];
        match value.data_type() {
            None if column.is_nullable() => Ok(Value::Null),
            None => Err(Error::null_constraint(column.name().to_string())),
            Some(got) => value.coerce_to(column.data_type()).ok_or_else(|| {
                Error::type_mismatch(column.name().to_string(), column.data_type(), got)
            }),
        }
    }
}

/// Snapshot iterator returned by [`RowStore::scan`].
pub struct Scan {
    inner: alloc::vec::IntoIter<Arc<Row>>,
}

impl Iterator for Scan {
    type Item = Arc<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Scan {}
