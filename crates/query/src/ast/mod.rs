//! AST module for statements, query descriptors and predicates.

mod expr;
mod predicate;
mod statement;

pub use expr::{Operand, SortOrder};
pub use predicate::Predicate;
pub use statement::{
    DeleteStatement, InsertStatement, MutationStatement, OrderBy, QueryDescriptor, SelectItem,
    Statement, UpdateStatement,
};
