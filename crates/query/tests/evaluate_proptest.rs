//! Property-based tests for query evaluation.
//!
//! Random task tables are queried through the parser and executor and the
//! results are compared with straightforward filtering over the same data.

use proptest::prelude::*;
use tarn_core::pattern_match::like;
use tarn_core::schema::TableBuilder;
use tarn_core::{DataType, Row, Value};
use tarn_query::{evaluate, Binding, QueryDescriptor};
use tarn_storage::{Mutation, RowStore};

/// Strategy for (name, complete) pairs; keys are assigned 1..=n.
fn tasks_strategy(max_rows: usize) -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::vec(("[ab]{0,4}", 0i64..3), 0..max_rows)
}

fn store(tasks: &[(String, i64)]) -> RowStore {
    let schema = TableBuilder::new("tasks")
        .unwrap()
        .add_column("id", DataType::Int64)
        .unwrap()
        .add_column("name", DataType::String)
        .unwrap()
        .add_column("complete", DataType::Int64)
        .unwrap()
        .primary_key("id")
        .unwrap()
        .build()
        .unwrap();
    let mut store = RowStore::new(schema);
    for (i, (name, complete)) in tasks.iter().enumerate() {
        let id = i as i64 + 1;
        let row = Row::new(
            Value::Int64(id),
            vec![Value::Int64(id), Value::from(name.as_str()), Value::Int64(*complete)],
        );
        store.apply(&Mutation::Insert(row)).unwrap();
    }
    store
}

fn ids(values: Vec<&Value>) -> Vec<i64> {
    values.into_iter().filter_map(|v| v.as_i64()).collect()
}

proptest! {
    /// Property: filtering matches a naive scan, in insertion order.
    #[test]
    fn filter_matches_naive_scan(
        tasks in tasks_strategy(30),
        pattern in "[ab%_]{0,3}",
        completed in 0i64..3,
    ) {
        let store = store(&tasks);
        let d = QueryDescriptor::prepare(
            "SELECT id FROM tasks WHERE name LIKE @filt AND complete = @completed",
        ).unwrap();
        let binding = Binding::new().with("filt", pattern.as_str()).with("completed", completed);
        let result = evaluate(&d, &binding, &store).unwrap();

        let expected: Vec<i64> = tasks
            .iter()
            .enumerate()
            .filter(|(_, (name, c))| *c == completed && like(name, &pattern))
            .map(|(i, _)| i as i64 + 1)
            .collect();
        prop_assert_eq!(ids(result.column_values("id")), expected);
    }

    /// Property: group counts are ascending by group and add up to the row count.
    #[test]
    fn group_counts_partition_rows(tasks in tasks_strategy(30)) {
        let store = store(&tasks);
        let d = QueryDescriptor::prepare(
            "SELECT complete, count(*) AS n FROM tasks GROUP BY complete",
        ).unwrap();
        let result = evaluate(&d, &Binding::new(), &store).unwrap();

        let groups = ids(result.column_values("complete"));
        let mut sorted = groups.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(&groups, &sorted);

        let total: i64 = ids(result.column_values("n")).iter().sum();
        prop_assert_eq!(total, tasks.len() as i64);
        for (group, count) in groups.iter().zip(ids(result.column_values("n"))) {
            let expected = tasks.iter().filter(|(_, c)| c == group).count() as i64;
            prop_assert_eq!(count, expected);
        }
    }

    /// Property: evaluation is pure; the same inputs give the same result.
    #[test]
    fn evaluation_is_deterministic(tasks in tasks_strategy(20), completed in 0i64..3) {
        let store = store(&tasks);
        let d = QueryDescriptor::prepare(
            "SELECT * FROM tasks WHERE complete = @c ORDER BY name DESC",
        ).unwrap();
        let binding = Binding::new().with("c", completed);
        let first = evaluate(&d, &binding, &store).unwrap();
        let second = evaluate(&d, &binding, &store).unwrap();
        prop_assert_eq!(first, second);
    }
}
