//! Query results.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use tarn_core::Value;

/// Column names plus rows of values.
///
/// Two result sets are equal when both their columns and their rows are
/// equal, in order. Subscriptions rely on this to suppress no-op notifications.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a result column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of a named column in row `row`.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Every value of one column, top to bottom.
    pub fn column_values(&self, column: &str) -> Vec<&Value> {
        match self.column_index(column) {
            Some(idx) => self.rows.iter().filter_map(|r| r.get(idx)).collect(),
            None => Vec::new(),
        }
    }
}

impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.columns.join(" | "))?;
        for row in &self.rows {
            for (i, value) in row.iter().enumerate() {
                if i > 0 {
                    f.write_str(" | ")?;
                }
                write!(f, "{}", value)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    fn sample() -> ResultSet {
        ResultSet::new(
            vec!["id".into(), "name".into()],
            vec![
                vec![Value::Int64(1), Value::from("buy milk")],
                vec![Value::Int64(2), Value::from("walk dog")],
            ],
        )
    }

    #[test]
    fn test_accessors() {
        let rs = sample();
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.get(1, "name"), Some(&Value::from("walk dog")));
        assert_eq!(rs.get(2, "name"), None);
        assert_eq!(rs.get(0, "missing"), None);
        assert_eq!(rs.column_values("id"), vec![&Value::Int64(1), &Value::Int64(2)]);
    }

    #[test]
    fn test_structural_equality() {
        let renamed = ResultSet::new(vec!["key".into(), "name".into()], sample().into_rows());
        assert_ne!(sample(), renamed);
        assert_eq!(sample(), sample());
    }

    #[test]
    fn test_display() {
        let text = sample().to_string();
        assert!(text.starts_with("id | name\n1 | 'buy milk'\n"));
    }
}
