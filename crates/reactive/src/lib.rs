//! Tarn Reactive - Live query subscriptions for the Tarn replica.
//!
//! A subscription keeps a query result current: whenever a mutation touches
//! the table and columns a query reads, the query is re-evaluated and the
//! callback receives the new result if (and only if) it differs from the last
//! published one.
//!
//! # Core Concepts
//!
//! - `SubscriptionRegistry`: Owns live queries and routes `AffectedKeys` to them
//! - `Subscription`: Descriptor + binding + last published result + callback
//! - `Notification`: A changed result, fired after the caller releases its locks
//!
//! # Example
//!
//! ```rust
//! use tarn_reactive::SubscriptionRegistry;
//! use tarn_query::{Binding, QueryDescriptor, ResultSet};
//! use tarn_storage::{Mutation, TableCache};
//! use tarn_core::schema::TableBuilder;
//! use tarn_core::{DataType, Row, Value};
//!
//! let mut cache = TableCache::new();
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
//! cache.create_table(schema).unwrap();
//!
//! let mut registry = SubscriptionRegistry::new();
//! let open = QueryDescriptor::prepare("SELECT id FROM tasks WHERE complete = 0").unwrap();
//! let handle = registry
//!     .subscribe(open, Binding::new(), |rs: &ResultSet| println!("{}", rs), &cache)
//!     .unwrap();
//!
//! let row = Row::new(Value::Int64(1), vec![Value::Int64(1), Value::Int64(0)]);
//! let affected = cache.apply("tasks", &Mutation::Insert(row)).unwrap();
//! for notification in registry.on_change(&affected, &cache) {
//!     notification.fire();
//! }
//! assert_eq!(registry.result(handle).unwrap().len(), 1);
//! ```

#![no_std]

extern crate alloc;

pub mod registry;
pub mod subscription;

pub use registry::SubscriptionRegistry;
pub use subscription::{
    ChangeCallback, Notification, Subscription, SubscriptionHandle, SubscriptionId,
};
