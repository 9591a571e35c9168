//! Turning mutation statements into row-level mutations.

use crate::ast::{InsertStatement, MutationStatement, Predicate, UpdateStatement};
use crate::binding::Binding;
use crate::executor::{BoundPredicate, FilterExecutor};
use alloc::format;
use alloc::vec::Vec;
use tarn_core::schema::Table;
use tarn_core::{Error, Result, Row, Value};
use tarn_storage::{ColumnDelta, Mutation, RowStore};

impl MutationStatement {
    /// Resolves the statement against the current rows of `store`.
    ///
    /// INSERT yields one mutation; an omitted or NULL integer primary key is
    /// allocated from the store. UPDATE and DELETE yield one mutation per
    /// matching key, possibly none.
    pub fn plan(&self, binding: &Binding, store: &mut RowStore) -> Result<Vec<Mutation>> {
        if store.name() != self.table() {
            return Err(Error::table_not_found(self.table()));
        }
        binding.check(&self.params())?;
        match self {
            MutationStatement::Insert(s) => plan_insert(s, binding, store).map(|m| alloc::vec![m]),
            MutationStatement::Update(s) => plan_update(s, binding, store),
            MutationStatement::Delete(s) => Ok(matching_keys(s.predicate.as_ref(), binding, store)?
                .into_iter()
                .map(Mutation::delete)
                .collect()),
        }
    }
}

impl MutationStatement {
    /// Returns true for an INSERT that leaves its primary key to be allocated,
    /// by omitting the key column or binding it to NULL.
    pub fn allocates_key(&self, binding: &Binding, schema: &Table) -> bool {
        let MutationStatement::Insert(s) = self else {
            return false;
        };
        let pk = schema.primary_key_index();
        match s
            .columns
            .iter()
            .position(|c| schema.column_index(c).ok() == Some(pk))
        {
            None => true,
            Some(i) => s
                .values
                .get(i)
                .is_some_and(|op| binding.resolve(op).is_ok_and(|v| v.is_null())),
        }
    }
}

fn coerce(schema: &Table, index: usize, value: Value) -> Result<Value> {
    let column = &schema.columns()[index];
    let got = value.data_type();
    value.coerce_to(column.data_type()).ok_or_else(|| {
        Error::type_mismatch(
            column.name(),
            column.data_type(),
            got.unwrap_or(column.data_type()),
        )
    })
}

fn plan_insert(s: &InsertStatement, binding: &Binding, store: &mut RowStore) -> Result<Mutation> {
    let schema = store.schema();
    let mut values = alloc::vec![Value::Null; schema.columns().len()];
    let mut assigned = alloc::vec![false; values.len()];
    for (column, operand) in s.columns.iter().zip(&s.values) {
        let idx = schema.column_index(column)?;
        if assigned[idx] {
            return Err(Error::invalid_operation(format!(
                "Column {} assigned twice",
                column
            )));
        }
        assigned[idx] = true;
        values[idx] = coerce(schema, idx, binding.resolve(operand)?)?;
    }

    let pk = schema.primary_key_index();
    if values[pk].is_null() {
        values[pk] = store.next_key()?;
    }
    let key = values[pk].clone();
    Ok(Mutation::Insert(Row::new(key, values)))
}

fn plan_update(s: &UpdateStatement, binding: &Binding, store: &RowStore) -> Result<Vec<Mutation>> {
    let schema = store.schema();
    let mut changes = Vec::with_capacity(s.assignments.len());
    for (column, operand) in &s.assignments {
        let idx = schema.column_index(column)?;
        if idx == schema.primary_key_index() {
            return Err(Error::invalid_operation(format!(
                "Cannot update primary key column {}",
                column
            )));
        }
        changes.push(ColumnDelta::new(
            column.as_str(),
            coerce(schema, idx, binding.resolve(operand)?)?,
        ));
    }
    Ok(matching_keys(s.predicate.as_ref(), binding, store)?
        .into_iter()
        .map(|key| Mutation::update(key, changes.clone()))
        .collect())
}

fn matching_keys(
    predicate: Option<&Predicate>,
    binding: &Binding,
    store: &RowStore,
) -> Result<Vec<Value>> {
    let bound = predicate
        .map(|p| BoundPredicate::bind(p, binding, store.schema()))
        .transpose()?;
    Ok(FilterExecutor::new(bound)
        .execute(store.scan())
        .iter()
        .map(|row| row.key().clone())
        .collect())
}
