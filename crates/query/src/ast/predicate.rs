//! Predicate definitions for query filtering.

use super::expr::Operand;
use alloc::string::String;
use alloc::vec::Vec;

/// A filter over the columns of one table.
///
/// Only the shapes live queries need are supported: column equality, LIKE
/// substring matching and conjunction.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// `column = operand`
    Eq { column: String, operand: Operand },
    /// `column LIKE operand`
    Like { column: String, operand: Operand },
    /// All sub-predicates hold.
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(column: impl Into<String>, operand: Operand) -> Self {
        Predicate::Eq {
            column: column.into(),
            operand,
        }
    }

    pub fn like(column: impl Into<String>, operand: Operand) -> Self {
        Predicate::Like {
            column: column.into(),
            operand,
        }
    }

    /// Conjunction of two predicates, flattening nested ANDs.
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::And(mut a), Predicate::And(b)) => {
                a.extend(b);
                Predicate::And(a)
            }
            (Predicate::And(mut a), p) => {
                a.push(p);
                Predicate::And(a)
            }
            (p, Predicate::And(mut b)) => {
                b.insert(0, p);
                Predicate::And(b)
            }
            (p, q) => Predicate::And(alloc::vec![p, q]),
        }
    }

    /// Returns the columns referenced by this predicate.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |p| match p {
            Predicate::Eq { column, .. } | Predicate::Like { column, .. } => {
                out.push(column.as_str())
            }
            Predicate::And(_) => {}
        });
        out
    }

    /// Returns the parameter slots referenced by this predicate.
    pub fn params(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |p| match p {
            Predicate::Eq { operand, .. } | Predicate::Like { operand, .. } => {
                out.extend(operand.param())
            }
            Predicate::And(_) => {}
        });
        out
    }

    fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Predicate)) {
        f(self);
        if let Predicate::And(children) = self {
            for child in children {
                child.walk(f);
            }
        }
    }
}
