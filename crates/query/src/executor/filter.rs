//! Filter executor.

use crate::ast::Predicate;
use crate::binding::Binding;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use tarn_core::pattern_match::like;
use tarn_core::schema::Table;
use tarn_core::{DataType, Error, Result, Row, Value};

/// A predicate with parameters resolved and columns mapped to positions.
#[derive(Clone, Debug, PartialEq)]
pub enum BoundPredicate {
    Eq { index: usize, value: Value },
    Like { index: usize, pattern: String },
    And(Vec<BoundPredicate>),
}

impl BoundPredicate {
    /// Binds a predicate against a schema and parameter values.
    ///
    /// Equality operands are coerced to the column type; a LIKE pattern must
    /// be a string.
    pub fn bind(predicate: &Predicate, binding: &Binding, schema: &Table) -> Result<Self> {
        match predicate {
            Predicate::Eq { column, operand } => {
                let index = schema.column_index(column)?;
                let data_type = schema.columns()[index].data_type();
                let value = binding.resolve(operand)?;
                let got = value.data_type();
                let value = value.coerce_to(data_type).ok_or_else(|| {
                    Error::type_mismatch(column.as_str(), data_type, got.unwrap_or(data_type))
                })?;
                Ok(BoundPredicate::Eq { index, value })
            }
            Predicate::Like { column, operand } => {
                let index = schema.column_index(column)?;
                match binding.resolve(operand)? {
                    Value::String(pattern) => Ok(BoundPredicate::Like { index, pattern }),
                    other => Err(Error::type_mismatch(
                        column.as_str(),
                        DataType::String,
                        other.data_type().unwrap_or(DataType::String),
                    )),
                }
            }
            Predicate::And(parts) => parts
                .iter()
                .map(|p| Self::bind(p, binding, schema))
                .collect::<Result<Vec<_>>>()
                .map(BoundPredicate::And),
        }
    }

    /// Evaluates the predicate on a row. Comparisons against NULL never hold.
    pub fn eval(&self, row: &Row) -> bool {
        match self {
            BoundPredicate::Eq { index, value } => {
                !value.is_null() && row.get(*index).is_some_and(|v| v == value)
            }
            BoundPredicate::Like { index, pattern } => row
                .get(*index)
                .and_then(Value::as_str)
                .is_some_and(|s| like(s, pattern)),
            BoundPredicate::And(parts) => parts.iter().all(|p| p.eval(row)),
        }
    }
}

/// Filter executor - keeps rows matching a bound predicate.
pub struct FilterExecutor {
    predicate: Option<BoundPredicate>,
}

impl FilterExecutor {
    /// Creates a filter; `None` keeps every row.
    pub fn new(predicate: Option<BoundPredicate>) -> Self {
        Self { predicate }
    }

    /// Executes the filter, preserving input order.
    pub fn execute(&self, input: impl Iterator<Item = Arc<Row>>) -> Vec<Arc<Row>> {
        match &self.predicate {
            Some(p) => input.filter(|row| p.eval(row)).collect(),
            None => input.collect(),
        }
    }
}
