//! Tarn Core - Core types and schema definitions for the Tarn replica.
//!
//! This crate provides the foundational types shared by every layer:
//!
//! - `DataType`: Supported column types (Boolean, Int64, Float64, String)
//! - `Value`: Runtime values stored in a row
//! - `Row`: A primary key, a local version and positional column values
//! - `schema`: Table and column definitions
//! - `Error`: Error types for local store and query operations
//!
//! # Example
//!
//! ```rust
//! use tarn_core::{DataType, Value, Row};
//! use tarn_core::schema::TableBuilder;
//!
//! let table = TableBuilder::new("tasks")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("name", DataType::String)
//!     .unwrap()
//!     .primary_key("id")
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let row = Row::new(Value::Int64(1), vec![
//!     Value::Int64(1),
//!     Value::String("buy milk".into()),
//! ]);
//!
//! assert_eq!(table.primary_key_index(), 0);
//! assert_eq!(row.get(1), Some(&Value::String("buy milk".into())));
//! ```

#![no_std]

extern crate alloc;

mod error;
pub mod pattern_match;
mod row;
pub mod schema;
mod types;
mod value;

pub use error::{Error, Result};
pub use row::{Row, Version};
pub use types::DataType;
pub use value::Value;
