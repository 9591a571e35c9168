//! Query executor module.
//!
//! Evaluation is a straight pipeline over one table: scan, filter, then
//! either aggregate or sort and project.

mod aggregate;
mod dml;
mod filter;
mod project;
mod sort;

pub use aggregate::AggregateExecutor;
pub use filter::{BoundPredicate, FilterExecutor};
pub use project::ProjectExecutor;
pub use sort::{sort_rows, SortExecutor};

use crate::ast::QueryDescriptor;
use crate::binding::Binding;
use crate::result::ResultSet;
use alloc::vec::Vec;
use tarn_core::schema::Table;
use tarn_core::{Error, Result};
use tarn_storage::{RowStore, Scan, TableCache};

/// Where evaluation reads rows from.
pub trait RowSource {
    /// Schema of a table, failing with `TableNotFound`.
    fn schema(&self, table: &str) -> Result<&Table>;

    /// Snapshot scan of a table in insertion order.
    fn scan(&self, table: &str) -> Result<Scan>;
}

impl RowSource for RowStore {
    fn schema(&self, table: &str) -> Result<&Table> {
        if self.name() == table {
            Ok(RowStore::schema(self))
        } else {
            Err(Error::table_not_found(table))
        }
    }

    fn scan(&self, table: &str) -> Result<Scan> {
        RowSource::schema(self, table)?;
        Ok(RowStore::scan(self))
    }
}

impl RowSource for TableCache {
    fn schema(&self, table: &str) -> Result<&Table> {
        self.table(table).map(|store| store.schema())
    }

    fn scan(&self, table: &str) -> Result<Scan> {
        self.table(table).map(|store| store.scan())
    }
}

/// Evaluates a query descriptor with a binding against the current rows.
///
/// The result depends only on the descriptor, the binding and the rows.
pub fn evaluate<S: RowSource + ?Sized>(
    descriptor: &QueryDescriptor,
    binding: &Binding,
    source: &S,
) -> Result<ResultSet> {
    let schema = source.schema(descriptor.table())?;
    descriptor.validate(schema)?;
    binding.check(descriptor.params())?;

    let predicate = descriptor
        .predicate()
        .map(|p| BoundPredicate::bind(p, binding, schema))
        .transpose()?;
    let mut rows = FilterExecutor::new(predicate).execute(source.scan(descriptor.table())?);
    let columns = descriptor.output_columns(schema);

    let out = if descriptor.is_aggregate() {
        let group_by = descriptor
            .group_by()
            .map(|g| schema.column_index(g))
            .transpose()?;
        let mut out = AggregateExecutor::new(group_by, descriptor.items()).execute(&rows);
        if let Some(order) = descriptor.order_by() {
            if let Some(idx) = columns.iter().position(|c| *c == order.column) {
                sort_rows(&mut out, idx, order.order);
            }
        }
        out
    } else {
        if let Some(order) = descriptor.order_by() {
            let idx = schema.column_index(&order.column)?;
            SortExecutor::new(idx, order.order).execute(&mut rows, |r| r.values());
        }
        let positions = columns
            .iter()
            .map(|c| schema.column_index(c))
            .collect::<Result<Vec<_>>>()?;
        ProjectExecutor::new(positions).execute(&rows)
    };
    Ok(ResultSet::new(columns, out))
}
