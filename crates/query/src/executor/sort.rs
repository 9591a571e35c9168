//! Sort executor.

use crate::ast::SortOrder;
use alloc::vec::Vec;
use core::cmp::Ordering;
use tarn_core::Value;

/// Sort executor - orders rows by one column.
///
/// The sort is stable: rows with equal keys keep their input order, which is
/// table scan order.
pub struct SortExecutor {
    column: usize,
    order: SortOrder,
}

impl SortExecutor {
    /// Creates a new sort executor over the column at `column`.
    pub fn new(column: usize, order: SortOrder) -> Self {
        Self { column, order }
    }

    /// Sorts items, reading the key through `values`.
    pub fn execute<T>(&self, input: &mut [T], values: impl Fn(&T) -> &[Value]) {
        input.sort_by(|a, b| self.compare(values(a), values(b)));
    }

    fn compare(&self, a: &[Value], b: &[Value]) -> Ordering {
        let cmp = match (a.get(self.column), b.get(self.column)) {
            (Some(av), Some(bv)) => av.cmp(bv),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        match self.order {
            SortOrder::Asc => cmp,
            SortOrder::Desc => cmp.reverse(),
        }
    }
}

/// Sorts value rows in place.
pub fn sort_rows(rows: &mut [Vec<Value>], column: usize, order: SortOrder) {
    SortExecutor::new(column, order).execute(rows, |r| r.as_slice());
}
