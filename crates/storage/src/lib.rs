//! Tarn Storage - Local row storage for the Tarn replica.
//!
//! This crate provides the storage layer including:
//!
//! - `RowStore`: Rows of one table keyed by primary key, versioned, in insertion order
//! - `TableCache`: Multi-table store management
//! - `Mutation` / `AffectedKeys`: Row-level writes and the keys they changed
//! - `MutationLog`: Ordered ledger of local writes awaiting remote acknowledgement
//!
//! # Example
//!
//! ```rust
//! use tarn_storage::{Mutation, MutationLog, TableCache};
//! use tarn_core::schema::TableBuilder;
//! use tarn_core::{DataType, Row, Value};
//!
//! let mut cache = TableCache::new();
//! let schema = TableBuilder::new("tasks")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("name", DataType::String)
//!     .unwrap()
//!     .primary_key("id")
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! cache.create_table(schema).unwrap();
//!
//! // Optimistic write: log it, then apply it locally right away.
//! let mut log = MutationLog::new();
//! let row = Row::new(Value::Int64(1), vec![Value::Int64(1), Value::String("buy milk".into())]);
//! let mutation = Mutation::Insert(row);
//! cache.apply("tasks", &mutation).unwrap();
//! let seq = log.append("tasks", mutation);
//!
//! assert_eq!(cache.get_table("tasks").unwrap().len(), 1);
//! log.ack_through(seq);
//! assert!(log.is_empty());
//! ```

#![no_std]

extern crate alloc;

pub mod cache;
pub mod log;
pub mod mutation;
pub mod row_store;

pub use cache::TableCache;
pub use log::{LogEntry, MutationLog};
pub use mutation::{AffectedKeys, ChangedColumns, ColumnDelta, Mutation, SequenceNumber};
pub use row_store::{RowStore, Scan};
