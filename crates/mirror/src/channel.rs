//! The boundary to the remote authoritative store.

use std::fmt;
use std::sync::Arc;
use tarn_core::{Value, Version};
use tarn_storage::{LogEntry, Mutation, SequenceNumber};
use thiserror::Error;

/// The channel could not reach the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Why a mutation was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Not delivered; retried after reconnecting.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Delivered and refused for good. The entry is dropped and the table
    /// resynchronized from a snapshot.
    #[error("mutation rejected: {reason}")]
    Rejected { reason: String },
    /// Refused because the remote already has a row with the inserted key.
    /// An insert whose key was allocated locally is moved to a fresh key and
    /// sent again; any other write is handled like `Rejected`.
    #[error("key already exists: {reason}")]
    KeyConflict { reason: String },
}

/// Outcome of a delivered mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Durable on the remote; the log is acknowledged through this entry.
    Confirmed,
    /// Accepted; confirmation follows as `ChannelEvent::Acked`.
    Deferred,
}

/// How a (re)connected channel picks up the stream of changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Deltas missed while away will be delivered.
    Incremental,
    /// Missed deltas are gone; every mirrored table must be reloaded.
    SnapshotRequired,
}

/// One row of a table snapshot, in schema column order.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRow {
    pub values: Vec<Value>,
    pub version: Version,
}

/// A change committed on the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDelta {
    pub table: String,
    pub mutation: Mutation,
    /// Remote version of the row after this change.
    pub version: Version,
}

/// Pushed by the channel, possibly from another thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Delta(RemoteDelta),
    Acked { through: SequenceNumber },
    Disconnected { reason: String },
    Reconnected(Resume),
}

/// Where a channel delivers its events.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<dyn Fn(ChannelEvent) + Send + Sync>,
}

impl EventSink {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(ChannelEvent) + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    pub fn emit(&self, event: ChannelEvent) {
        (self.inner)(event)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

/// Bidirectional link to the remote authoritative store.
///
/// Deliveries are at least once: the same delta may arrive more than once and
/// the same mutation may be sent more than once.
pub trait SyncChannel: Send + Sync {
    /// Opens the link. Events are pushed to `events` until `disconnect`.
    fn connect(&self, events: EventSink) -> Result<Resume, TransportError>;

    /// Current authoritative rows of a table.
    fn request_snapshot(&self, table: &str) -> Result<Vec<RemoteRow>, TransportError>;

    /// Forwards one local mutation.
    fn send_mutation(&self, entry: &LogEntry) -> Result<Ack, SendError>;

    fn disconnect(&self);
}
