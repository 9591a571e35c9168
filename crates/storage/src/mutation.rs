//! Row-level mutations and the key sets they affect.

use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashSet;
use tarn_core::{Row, Value};

/// Locally assigned, strictly increasing mutation sequence number.
pub type SequenceNumber = u64;

/// A single column assignment inside an update.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDelta {
    pub column: String,
    pub value: Value,
}

impl ColumnDelta {
    pub fn new(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// A row-level write against one table.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    /// Inserts a full row.
    Insert(Row),
    /// Assigns new values to some columns of an existing row.
    Update { key: Value, changes: Vec<ColumnDelta> },
    /// Removes a row.
    Delete { key: Value },
}

impl Mutation {
    /// Creates an update mutation.
    pub fn update(key: impl Into<Value>, changes: Vec<ColumnDelta>) -> Self {
        Mutation::Update {
            key: key.into(),
            changes,
        }
    }

    /// Creates a delete mutation.
    pub fn delete(key: impl Into<Value>) -> Self {
        Mutation::Delete { key: key.into() }
    }

    /// Returns the primary key this mutation addresses.
    pub fn key(&self) -> &Value {
        match self {
            Mutation::Insert(row) => row.key(),
            Mutation::Update { key, .. } => key,
            Mutation::Delete { key } => key,
        }
    }

    /// The same write addressed to another key. An inserted row also gets
    /// `key` in its primary-key column at `pk_index`.
    pub fn rekeyed(&self, key: Value, pk_index: usize) -> Mutation {
        match self {
            Mutation::Insert(row) => {
                let mut values = row.values().to_vec();
                if let Some(slot) = values.get_mut(pk_index) {
                    *slot = key.clone();
                }
                Mutation::Insert(Row::new(key, values))
            }
            Mutation::Update { changes, .. } => Mutation::Update {
                key,
                changes: changes.clone(),
            },
            Mutation::Delete { .. } => Mutation::Delete { key },
        }
    }

    /// Returns a short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Insert(_) => "insert",
            Mutation::Update { .. } => "update",
            Mutation::Delete { .. } => "delete",
        }
    }
}

/// Which columns of the affected rows changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangedColumns {
    /// Rows appeared or disappeared; every column counts as changed.
    All,
    /// Only these columns were assigned.
    Only(BTreeSet<String>),
}

impl ChangedColumns {
    /// Returns true if any of `columns` is among the changed ones.
    pub fn intersects<'a>(&self, mut columns: impl Iterator<Item = &'a str>) -> bool {
        match self {
            ChangedColumns::All => true,
            ChangedColumns::Only(set) => columns.any(|c| set.contains(c)),
        }
    }

    fn union(&mut self, other: ChangedColumns) {
        match (&mut *self, other) {
            (ChangedColumns::All, _) => {}
            (_, ChangedColumns::All) => *self = ChangedColumns::All,
            (ChangedColumns::Only(a), ChangedColumns::Only(b)) => a.extend(b),
        }
    }
}

/// The set of rows (and columns) changed by one or more applied mutations.
///
/// Produced by the row store, consumed by the subscription registry to decide
/// which live queries need re-evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AffectedKeys {
    pub table: String,
    pub keys: Vec<Value>,
    pub columns: ChangedColumns,
}

impl AffectedKeys {
    /// Affected keys where whole rows changed.
    pub fn rows(table: impl Into<String>, keys: Vec<Value>) -> Self {
        Self {
            table: table.into(),
            keys,
            columns: ChangedColumns::All,
        }
    }

    /// Affected key with only some columns assigned.
    pub fn columns(table: impl Into<String>, key: Value, columns: BTreeSet<String>) -> Self {
        Self {
            table: table.into(),
            keys: alloc::vec![key],
            columns: ChangedColumns::Only(columns),
        }
    }

    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Folds another change on the same table into this one.
    pub fn merge(&mut self, other: AffectedKeys) {
        self.merge_all(core::iter::once(other));
    }

    /// Folds a batch of changes on the same table into this one. Keys stay in
    /// first-seen order.
    pub fn merge_all(&mut self, others: impl IntoIterator<Item = AffectedKeys>) {
        let mut seen: HashSet<Value> = self.keys.iter().cloned().collect();
        for other in others {
            debug_assert_eq!(self.table, other.table);
            for key in other.keys {
                if seen.insert(key.clone()) {
                    self.keys.push(key);
                }
            }
            self.columns.union(other.columns);
        }
    }
}
