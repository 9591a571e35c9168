//! Tarn Query - Parameterized queries for the Tarn replica.
//!
//! This crate provides the query layer including:
//!
//! - `parser`: Statement text to `Statement` (SELECT, INSERT, UPDATE, DELETE, CREATE TABLE)
//! - `ast`: Query descriptors, predicates and mutation statements
//! - `binding`: Named parameter values, re-bindable without re-parsing
//! - `executor`: Evaluation over a `RowSource` (filter, group count, sort, project)
//! - `result`: Result sets with structural equality
//!
//! # Example
//!
//! ```rust
//! use tarn_query::{evaluate, Binding, QueryDescriptor};
//! use tarn_storage::{Mutation, RowStore};
//! use tarn_core::schema::TableBuilder;
//! use tarn_core::{DataType, Row, Value};
//!
//! let schema = TableBuilder::new("tasks")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("complete", DataType::Int64)
//!     .unwrap()
//!     .primary_key("id")
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! let mut store = RowStore::new(schema);
//! for (id, complete) in [(1, 0), (2, 1), (3, 0)] {
//!     let row = Row::new(Value::Int64(id), vec![Value::Int64(id), Value::Int64(complete)]);
//!     store.apply(&Mutation::Insert(row)).unwrap();
//! }
//!
//! let open = QueryDescriptor::prepare("SELECT id FROM tasks WHERE complete = @completed").unwrap();
//! let result = evaluate(&open, &Binding::new().with("completed", 0i64), &store).unwrap();
//! assert_eq!(result.rows(), &[vec![Value::Int64(1)], vec![Value::Int64(3)]]);
//! ```

#![no_std]

extern crate alloc;

pub mod ast;
pub mod binding;
pub mod executor;
pub mod parser;
pub mod result;

pub use ast::{MutationStatement, QueryDescriptor, Statement};
pub use binding::Binding;
pub use executor::{evaluate, RowSource};
pub use parser::parse;
pub use result::ResultSet;
