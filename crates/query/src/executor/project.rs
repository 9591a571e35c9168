//! Projection executor.

use alloc::sync::Arc;
use alloc::vec::Vec;
use tarn_core::{Row, Value};

/// Project executor - copies selected columns out of stored rows.
pub struct ProjectExecutor {
    columns: Vec<usize>,
}

impl ProjectExecutor {
    /// Creates a projection over column positions, in output order.
    pub fn new(columns: Vec<usize>) -> Self {
        Self { columns }
    }

    pub fn execute(&self, input: &[Arc<Row>]) -> Vec<Vec<Value>> {
        input
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect()
    }
}
