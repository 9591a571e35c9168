//! Tarn Mirror - A local replica that mirrors tables of a remote store.
//!
//! `LocalDb` is the application boundary. Writes are applied to the local
//! row store right away, logged, and forwarded to the remote store over a
//! [`SyncChannel`]; remote changes stream back as deltas and are reconciled
//! with the writes still pending. Live queries are re-evaluated whenever a
//! change reaches the rows they read.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tarn_mirror::{LocalDb, LoopbackRemote, MirrorState};
//! use tarn_query::{Binding, ResultSet};
//!
//! let db = LocalDb::new();
//! db.schema("CREATE TABLE tasks (id INTEGER PRIMARY KEY, name TEXT, complete INTEGER)")
//!     .unwrap();
//!
//! let remote = LoopbackRemote::new();
//! remote.create_table(db.table_schema("tasks").unwrap());
//! db.mirror(remote.channel("local"), &["tasks"]).unwrap();
//! assert_eq!(db.state(), MirrorState::Mirroring);
//!
//! let open = db
//!     .subscribe_query(
//!         "SELECT * FROM tasks WHERE complete = @completed",
//!         Binding::new().with("completed", 0i64),
//!         |rs: &ResultSet| println!("{} open tasks", rs.len()),
//!     )
//!     .unwrap();
//!
//! db.mutate(
//!     "INSERT INTO tasks (name, complete) VALUES (@name, 0)",
//!     &Binding::new().with("name", "buy milk"),
//! )
//! .unwrap();
//! assert_eq!(db.subscription_result(open).unwrap().len(), 1);
//! assert_eq!(remote.rows("tasks").len(), 1);
//! assert_eq!(db.pending_count(), 0);
//! ```

pub mod channel;
pub mod config;
pub mod db;
pub mod error;
pub mod loopback;
mod reconcile;
pub mod state;

pub use channel::{
    Ack, ChannelEvent, EventSink, RemoteDelta, RemoteRow, Resume, SendError, SyncChannel,
    TransportError,
};
pub use config::MirrorConfig;
pub use db::{LocalDb, MutationOutcome};
pub use error::{Error, Result};
pub use loopback::{LoopbackChannel, LoopbackRemote};
pub use state::MirrorState;
