//! Grouped count aggregation.

use crate::ast::SelectItem;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use tarn_core::{Row, Value};

/// Aggregate executor - `count(*)`, optionally grouped by one column.
///
/// Groups come out in ascending group-value order. Without a grouping column
/// the output is a single row, even for empty input.
pub struct AggregateExecutor<'a> {
    group_by: Option<usize>,
    items: &'a [SelectItem],
}

impl<'a> AggregateExecutor<'a> {
    pub fn new(group_by: Option<usize>, items: &'a [SelectItem]) -> Self {
        Self { group_by, items }
    }

    pub fn execute(&self, input: &[Arc<Row>]) -> Vec<Vec<Value>> {
        let Some(column) = self.group_by else {
            return alloc::vec![self.output_row(&Value::Null, input.len())];
        };
        let mut groups: BTreeMap<Value, usize> = BTreeMap::new();
        for row in input {
            let key = row.get(column).cloned().unwrap_or(Value::Null);
            *groups.entry(key).or_insert(0) += 1;
        }
        groups
            .iter()
            .map(|(key, count)| self.output_row(key, *count))
            .collect()
    }

    fn output_row(&self, key: &Value, count: usize) -> Vec<Value> {
        self.items
            .iter()
            .map(|item| match item {
                SelectItem::Count { .. } => Value::Int64(count as i64),
                _ => key.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn task(id: i64, complete: i64) -> Arc<Row> {
        Arc::new(Row::new(
            Value::Int64(id),
            vec![Value::Int64(id), Value::Int64(complete)],
        ))
    }

    #[test]
    fn test_group_count_ascending() {
        let items = [
            SelectItem::Column("complete".into()),
            SelectItem::Count { alias: "n".into() },
        ];
        let rows = vec![task(1, 1), task(2, 0), task(3, 1)];
        let out = AggregateExecutor::new(Some(1), &items).execute(&rows);
        assert_eq!(
            out,
            vec![
                vec![Value::Int64(0), Value::Int64(1)],
                vec![Value::Int64(1), Value::Int64(2)],
            ]
        );
    }

    #[test]
    fn test_ungrouped_count() {
        let items = [SelectItem::Count { alias: "count".into() }];
        let out = AggregateExecutor::new(None, &items).execute(&[]);
        assert_eq!(out, vec![vec![Value::Int64(0)]]);
        assert!(AggregateExecutor::new(Some(1), &items).execute(&[]).is_empty());
    }
}
