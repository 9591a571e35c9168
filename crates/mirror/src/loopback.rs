//! In-process authoritative store implementing [`SyncChannel`] for several
//! replicas.
//!
//! Every accepted mutation gets the next commit version and is fanned out to
//! every connected replica, the writer included. Replicas that are away have
//! their deltas buffered and delivered on an incremental resume. Faults can
//! be injected to exercise the retry and resync paths.

use crate::channel::{
    Ack, ChannelEvent, EventSink, RemoteDelta, RemoteRow, Resume, SendError, SyncChannel,
    TransportError,
};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tarn_core::schema::Table;
use tarn_core::{Result as StoreResult, Row, Value, Version};
use tarn_storage::{LogEntry, Mutation, RowStore, SequenceNumber};
use tracing::debug;

#[derive(Default)]
struct ClientLink {
    sink: Option<EventSink>,
    /// Highest sequence applied from this client.
    last_seq: SequenceNumber,
    /// Highest sequence the client has been told is confirmed.
    acked: SequenceNumber,
    /// Deltas committed while the client was away.
    missed: Vec<RemoteDelta>,
}

#[derive(Default)]
struct Faults {
    failing_connects: u32,
    failing_snapshots: u32,
    force_snapshot_resume: bool,
    defer_acks: bool,
    reject_next: Option<String>,
}

#[derive(Default)]
struct RemoteInner {
    tables: BTreeMap<String, RowStore>,
    row_versions: HashMap<(String, Value), Version>,
    commit: Version,
    clients: BTreeMap<String, ClientLink>,
    faults: Faults,
}

impl RemoteInner {
    fn commit(&mut self, table: &str, mutation: Mutation) -> RemoteDelta {
        self.commit += 1;
        self.row_versions
            .insert((table.to_string(), mutation.key().clone()), self.commit);
        RemoteDelta {
            table: table.to_string(),
            mutation,
            version: self.commit,
        }
    }

    /// Sinks to deliver `delta` to; absent clients get it buffered.
    fn fan_out(&mut self, delta: &RemoteDelta) -> Vec<EventSink> {
        let mut sinks = Vec::new();
        for link in self.clients.values_mut() {
            match &link.sink {
                Some(sink) => sinks.push(sink.clone()),
                None => link.missed.push(delta.clone()),
            }
        }
        sinks
    }
}

/// The shared remote store. Cheap to clone.
#[derive(Clone, Default)]
pub struct LoopbackRemote {
    inner: Arc<Mutex<RemoteInner>>,
}

impl LoopbackRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an authoritative table.
    pub fn create_table(&self, schema: Table) {
        let name = schema.name().to_string();
        self.inner.lock().tables.insert(name, RowStore::new(schema));
    }

    /// Inserts a row directly on the remote, as if another writer had.
    /// Connected replicas receive the delta.
    pub fn insert(&self, table: &str, values: Vec<Value>) -> StoreResult<Version> {
        self.commit_external(table, |store| {
            let key = values
                .get(store.schema().primary_key_index())
                .cloned()
                .unwrap_or(Value::Null);
            Ok(Mutation::Insert(Row::new(key, values)))
        })
    }

    /// Applies a mutation directly on the remote, as if another writer had.
    pub fn apply(&self, table: &str, mutation: Mutation) -> StoreResult<Version> {
        self.commit_external(table, |_| Ok(mutation))
    }

    fn commit_external(
        &self,
        table: &str,
        make: impl FnOnce(&RowStore) -> StoreResult<Mutation>,
    ) -> StoreResult<Version> {
        let (sinks, delta) = {
            let mut inner = self.inner.lock();
            let store = inner
                .tables
                .get_mut(table)
                .ok_or_else(|| tarn_core::Error::table_not_found(table))?;
            let mutation = make(store)?;
            store.apply(&mutation)?;
            let delta = inner.commit(table, mutation);
            (inner.fan_out(&delta), delta)
        };
        let version = delta.version;
        for sink in sinks {
            sink.emit(ChannelEvent::Delta(delta.clone()));
        }
        Ok(version)
    }

    /// Re-delivers an already committed delta to every connected replica.
    pub fn redeliver(&self, delta: &RemoteDelta) {
        let sinks: Vec<EventSink> = self
            .inner
            .lock()
            .clients
            .values()
            .filter_map(|c| c.sink.clone())
            .collect();
        for sink in sinks {
            sink.emit(ChannelEvent::Delta(delta.clone()));
        }
    }

    /// Current rows of a table in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Vec<Value>> {
        self.inner
            .lock()
            .tables
            .get(table)
            .map(|store| store.scan().map(|r| r.values().to_vec()).collect())
            .unwrap_or_default()
    }

    /// Highest sequence applied from a client.
    pub fn client_sequence(&self, client_id: &str) -> SequenceNumber {
        self.inner
            .lock()
            .clients
            .get(client_id)
            .map_or(0, |c| c.last_seq)
    }

    /// A channel for one replica.
    pub fn channel(&self, client_id: impl Into<String>) -> Arc<LoopbackChannel> {
        Arc::new(LoopbackChannel {
            remote: self.clone(),
            client_id: client_id.into(),
        })
    }

    /// The next `n` connection attempts fail.
    pub fn fail_connects(&self, n: u32) {
        self.inner.lock().faults.failing_connects = n;
    }

    /// The next `n` snapshot requests fail.
    pub fn fail_snapshots(&self, n: u32) {
        self.inner.lock().faults.failing_snapshots = n;
    }

    /// The next connection resumes with `SnapshotRequired` and buffered
    /// deltas are discarded.
    pub fn force_snapshot_resume(&self) {
        self.inner.lock().faults.force_snapshot_resume = true;
    }

    /// While enabled, sends are answered `Deferred`; see [`release_acks`](Self::release_acks).
    pub fn defer_acks(&self, enabled: bool) {
        self.inner.lock().faults.defer_acks = enabled;
    }

    /// The next send is refused with `reason`.
    pub fn reject_next(&self, reason: impl Into<String>) {
        self.inner.lock().faults.reject_next = Some(reason.into());
    }

    /// Sends `Acked` to every connected client with unconfirmed mutations.
    pub fn release_acks(&self) {
        let pending: Vec<(EventSink, SequenceNumber)> = {
            let mut inner = self.inner.lock();
            inner
                .clients
                .values_mut()
                .filter(|c| c.last_seq > c.acked)
                .filter_map(|c| {
                    let sink = c.sink.clone()?;
                    c.acked = c.last_seq;
                    Some((sink, c.last_seq))
                })
                .collect()
        };
        for (sink, through) in pending {
            sink.emit(ChannelEvent::Acked { through });
        }
    }

    /// Drops a client's connection and tells it so.
    pub fn drop_connection(&self, client_id: &str, reason: &str) {
        let sink = self
            .inner
            .lock()
            .clients
            .get_mut(client_id)
            .and_then(|c| c.sink.take());
        if let Some(sink) = sink {
            sink.emit(ChannelEvent::Disconnected {
                reason: reason.to_string(),
            });
        }
    }

    /// Tells a dropped client the link is back, as a transport would after
    /// re-establishing it on its own.
    pub fn restore_connection(&self, client_id: &str, sink: EventSink) {
        match self.attach(client_id, sink.clone()) {
            Ok((resume, missed)) => {
                sink.emit(ChannelEvent::Reconnected(resume));
                for delta in missed {
                    sink.emit(ChannelEvent::Delta(delta));
                }
            }
            Err(e) => sink.emit(ChannelEvent::Disconnected { reason: e.message }),
        }
    }

    fn attach(
        &self,
        client_id: &str,
        sink: EventSink,
    ) -> Result<(Resume, Vec<RemoteDelta>), TransportError> {
        let mut inner = self.inner.lock();
        if inner.faults.failing_connects > 0 {
            inner.faults.failing_connects -= 1;
            return Err(TransportError::new("connection refused"));
        }
        let force = std::mem::take(&mut inner.faults.force_snapshot_resume);
        let link = inner.clients.entry(client_id.to_string()).or_default();
        link.sink = Some(sink);
        let missed = std::mem::take(&mut link.missed);
        if force {
            return Ok((Resume::SnapshotRequired, Vec::new()));
        }
        Ok((Resume::Incremental, missed))
    }
}

/// One replica's end of a [`LoopbackRemote`].
pub struct LoopbackChannel {
    remote: LoopbackRemote,
    client_id: String,
}

impl LoopbackChannel {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn remote(&self) -> &LoopbackRemote {
        &self.remote
    }
}

impl SyncChannel for LoopbackChannel {
    fn connect(&self, events: EventSink) -> Result<Resume, TransportError> {
        let (resume, missed) = self.remote.attach(&self.client_id, events.clone())?;
        debug!(client = %self.client_id, ?resume, missed = missed.len(), "loopback connected");
        for delta in missed {
            events.emit(ChannelEvent::Delta(delta));
        }
        Ok(resume)
    }

    fn request_snapshot(&self, table: &str) -> Result<Vec<RemoteRow>, TransportError> {
        let mut inner = self.remote.inner.lock();
        if inner.faults.failing_snapshots > 0 {
            inner.faults.failing_snapshots -= 1;
            return Err(TransportError::new("snapshot unavailable"));
        }
        if !inner
            .clients
            .get(&self.client_id)
            .is_some_and(|c| c.sink.is_some())
        {
            return Err(TransportError::new("not connected"));
        }
        let store = inner
            .tables
            .get(table)
            .ok_or_else(|| TransportError::new(format!("unknown table {}", table)))?;
        Ok(store
            .scan()
            .map(|row| RemoteRow {
                values: row.values().to_vec(),
                version: inner
                    .row_versions
                    .get(&(table.to_string(), row.key().clone()))
                    .copied()
                    .unwrap_or(0),
            })
            .collect())
    }

    fn send_mutation(&self, entry: &LogEntry) -> Result<Ack, SendError> {
        let (sinks, delta, ack) = {
            let mut inner = self.remote.inner.lock();
            let ack = if inner.faults.defer_acks {
                Ack::Deferred
            } else {
                Ack::Confirmed
            };
            let link = inner
                .clients
                .get(&self.client_id)
                .filter(|c| c.sink.is_some())
                .ok_or_else(|| TransportError::new("not connected"))?;
            if entry.seq <= link.last_seq {
                // Resent after a reconnect; applied already.
                return Ok(ack);
            }
            if let Some(reason) = inner.faults.reject_next.take() {
                return Err(SendError::Rejected { reason });
            }
            let applied = match inner.tables.get_mut(&entry.table) {
                Some(store) => store.apply(&entry.mutation),
                None => Err(tarn_core::Error::table_not_found(entry.table.as_str())),
            };
            match applied {
                Err(e @ tarn_core::Error::Conflict { .. }) => {
                    return Err(SendError::KeyConflict {
                        reason: e.to_string(),
                    })
                }
                Err(e) => {
                    return Err(SendError::Rejected {
                        reason: e.to_string(),
                    })
                }
                Ok(_) => {}
            }
            if let Some(link) = inner.clients.get_mut(&self.client_id) {
                link.last_seq = entry.seq;
                if ack == Ack::Confirmed {
                    link.acked = entry.seq;
                }
            }
            let delta = inner.commit(&entry.table, entry.mutation.clone());
            (inner.fan_out(&delta), delta, ack)
        };
        for sink in sinks {
            sink.emit(ChannelEvent::Delta(delta.clone()));
        }
        Ok(ack)
    }

    fn disconnect(&self) {
        if let Some(link) = self.remote.inner.lock().clients.get_mut(&self.client_id) {
            link.sink = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tarn_core::schema::TableBuilder;
    use tarn_core::DataType;
    use tarn_storage::ColumnDelta;

    fn remote() -> LoopbackRemote {
        let remote = LoopbackRemote::new();
        let schema = TableBuilder::new("tasks")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("complete", DataType::Int64)
            .unwrap()
            .primary_key("id")
            .unwrap()
            .build()
            .unwrap();
        remote.create_table(schema);
        remote
    }

    fn recorder() -> (EventSink, Arc<StdMutex<Vec<ChannelEvent>>>) {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink_events = events.clone();
        let sink = EventSink::new(move |e| sink_events.lock().unwrap().push(e));
        (sink, events)
    }

    fn entry(seq: SequenceNumber, mutation: Mutation) -> LogEntry {
        LogEntry {
            seq,
            table: "tasks".into(),
            mutation,
            allocated_key: false,
        }
    }

    fn insert(id: i64) -> Mutation {
        Mutation::Insert(Row::new(
            Value::Int64(id),
            vec![Value::Int64(id), Value::Int64(0)],
        ))
    }

    #[test]
    fn test_send_fans_out_including_echo() {
        let remote = remote();
        let a = remote.channel("a");
        let b = remote.channel("b");
        let (sink_a, events_a) = recorder();
        let (sink_b, events_b) = recorder();
        a.connect(sink_a).unwrap();
        b.connect(sink_b).unwrap();

        assert_eq!(a.send_mutation(&entry(1, insert(1))), Ok(Ack::Confirmed));
        assert_eq!(events_a.lock().unwrap().len(), 1);
        assert_eq!(events_b.lock().unwrap().len(), 1);
        assert_eq!(remote.rows("tasks").len(), 1);
    }

    #[test]
    fn test_resend_is_deduplicated() {
        let remote = remote();
        let a = remote.channel("a");
        let (sink, events) = recorder();
        a.connect(sink).unwrap();
        a.send_mutation(&entry(1, insert(1))).unwrap();
        assert_eq!(a.send_mutation(&entry(1, insert(1))), Ok(Ack::Confirmed));
        assert_eq!(events.lock().unwrap().len(), 1);
        assert_eq!(remote.client_sequence("a"), 1);
    }

    #[test]
    fn test_versions_increase_per_commit() {
        let remote = remote();
        remote.insert("tasks", vec![Value::Int64(1), Value::Int64(0)]).unwrap();
        let v = remote
            .apply("tasks", Mutation::update(1i64, vec![ColumnDelta::new("complete", 1i64)]))
            .unwrap();
        assert_eq!(v, 2);

        let a = remote.channel("a");
        let (sink, _) = recorder();
        a.connect(sink).unwrap();
        let snapshot = a.request_snapshot("tasks").unwrap();
        assert_eq!(snapshot[0].version, 2);
        assert_eq!(snapshot[0].values, vec![Value::Int64(1), Value::Int64(1)]);
    }

    #[test]
    fn test_missed_deltas_delivered_on_resume() {
        let remote = remote();
        let a = remote.channel("a");
        let (sink, events) = recorder();
        a.connect(sink.clone()).unwrap();
        remote.drop_connection("a", "network down");
        remote.insert("tasks", vec![Value::Int64(1), Value::Int64(0)]).unwrap();
        assert!(a.send_mutation(&entry(1, insert(2))).is_err());

        assert_eq!(a.connect(sink).unwrap(), Resume::Incremental);
        let events = events.lock().unwrap();
        assert!(matches!(events[0], ChannelEvent::Disconnected { .. }));
        assert!(matches!(events[1], ChannelEvent::Delta(_)));
    }

    #[test]
    fn test_faults() {
        let remote = remote();
        let a = remote.channel("a");
        let (sink, events) = recorder();

        remote.fail_connects(1);
        assert!(a.connect(sink.clone()).is_err());
        remote.force_snapshot_resume();
        assert_eq!(a.connect(sink).unwrap(), Resume::SnapshotRequired);

        remote.fail_snapshots(1);
        assert!(a.request_snapshot("tasks").is_err());
        assert!(a.request_snapshot("tasks").is_ok());

        remote.reject_next("read only");
        assert!(matches!(
            a.send_mutation(&entry(1, insert(1))),
            Err(SendError::Rejected { .. })
        ));
        assert!(matches!(
            a.send_mutation(&entry(2, Mutation::delete(9i64))),
            Err(SendError::Rejected { .. })
        ));

        remote.defer_acks(true);
        assert_eq!(a.send_mutation(&entry(3, insert(1))), Ok(Ack::Deferred));
        remote.release_acks();
        assert!(events
            .lock()
            .unwrap()
            .iter()
            .any(|e| *e == ChannelEvent::Acked { through: 3 }));

        assert!(matches!(
            a.send_mutation(&entry(4, insert(1))),
            Err(SendError::KeyConflict { .. })
        ));
        assert_eq!(remote.client_sequence("a"), 3);
    }
}
