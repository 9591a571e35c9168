//! The application-facing replica.

use crate::channel::{Ack, ChannelEvent, EventSink, RemoteDelta, RemoteRow, Resume, SendError, SyncChannel};
use crate::config::MirrorConfig;
use crate::error::{Error, Result};
use crate::reconcile::{Reconciled, ReplicaState};
use crate::state::MirrorState;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tarn_core::schema::Table;
use tarn_core::Value;
use tarn_query::{evaluate, parse, Binding, MutationStatement, QueryDescriptor, ResultSet, Statement};
use tarn_reactive::{Notification, SubscriptionHandle, SubscriptionRegistry};
use tarn_storage::{AffectedKeys, LogEntry, SequenceNumber};
use tracing::{debug, info, warn};

thread_local! {
    /// Replicas whose change callbacks are running on this thread.
    static IN_CALLBACK: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks the current thread as running one replica's change callbacks.
struct CallbackScope {
    replica: usize,
}

impl CallbackScope {
    fn enter(replica: usize) -> Self {
        IN_CALLBACK.with(|active| active.borrow_mut().push(replica));
        Self { replica }
    }

    fn active(replica: usize) -> bool {
        IN_CALLBACK.with(|active| active.borrow().contains(&replica))
    }
}

impl Drop for CallbackScope {
    fn drop(&mut self) {
        IN_CALLBACK.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(pos) = active.iter().rposition(|r| *r == self.replica) {
                active.remove(pos);
            }
        });
    }
}

/// Times one insert is moved to a new key before it is given up on.
const MAX_REKEYS: u32 = 16;

/// What a `mutate` call did.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MutationOutcome {
    /// Rows inserted, updated or deleted.
    pub affected_rows: usize,
    /// Log sequence numbers, one per row-level mutation.
    pub sequences: Vec<SequenceNumber>,
    /// Primary key of the inserted row, for INSERT.
    pub inserted_key: Option<Value>,
}

#[derive(Default)]
struct Outbound {
    /// Highest sequence handed to the channel since it went live.
    last_sent: SequenceNumber,
}

struct Inner {
    config: MirrorConfig,
    /// Sequence point for every apply-and-notify step.
    writer: Mutex<()>,
    replica: RwLock<ReplicaState>,
    registry: Mutex<SubscriptionRegistry>,
    phase: Mutex<MirrorState>,
    channel: Mutex<Option<Arc<dyn SyncChannel>>>,
    /// Taken only while `writer` is not held.
    outbound: Mutex<Outbound>,
    mirrored: Mutex<Vec<String>>,
    /// Set until the mirrored tables have been loaded from a snapshot.
    needs_snapshot: AtomicBool,
}

impl Inner {
    fn id(&self) -> usize {
        self as *const Inner as usize
    }

    fn in_callback(&self) -> bool {
        CallbackScope::active(self.id())
    }

    /// Runs change callbacks. Must be called with no replica or registry
    /// lock held.
    fn fire(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        let _scope = CallbackScope::enter(self.id());
        for notification in &notifications {
            notification.fire();
        }
    }

    /// Re-evaluates subscriptions against the rows behind `replica`. Both the
    /// read guard and the registry lock are released on return.
    fn collect(
        &self,
        replica: RwLockReadGuard<'_, ReplicaState>,
        affected: &[AffectedKeys],
    ) -> Vec<Notification> {
        let mut registry = self.registry.lock();
        let mut notifications = Vec::new();
        for keys in affected {
            notifications.extend(registry.on_change(keys, &replica.cache));
        }
        notifications
    }
}

/// A local replica: a row store with live queries, optionally mirroring
/// tables of a remote store.
///
/// Cloning is cheap and every clone refers to the same replica.
#[derive(Clone)]
pub struct LocalDb {
    inner: Arc<Inner>,
}

impl Default for LocalDb {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LocalDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalDb")
            .field("client_id", &self.inner.config.client_id)
            .field("state", &self.state())
            .finish()
    }
}

impl LocalDb {
    pub fn new() -> Self {
        Self::with_config(MirrorConfig::default())
    }

    pub fn with_config(config: MirrorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                writer: Mutex::new(()),
                replica: RwLock::new(ReplicaState::default()),
                registry: Mutex::new(SubscriptionRegistry::new()),
                phase: Mutex::new(MirrorState::Uninitialized),
                channel: Mutex::new(None),
                outbound: Mutex::new(Outbound::default()),
                mirrored: Mutex::new(Vec::new()),
                needs_snapshot: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.inner.config
    }

    /// Current mirror state.
    pub fn state(&self) -> MirrorState {
        *self.inner.phase.lock()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state() == MirrorState::Closed {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn set_state(&self, next: MirrorState) {
        let mut phase = self.inner.phase.lock();
        if *phase == MirrorState::Closed || *phase == next {
            return;
        }
        let from = std::mem::replace(&mut *phase, next);
        info!(client = %self.inner.config.client_id, %from, to = %next, "mirror state changed");
    }

    /// Creates a local table.
    pub fn define_table(&self, schema: Table) -> Result<()> {
        self.ensure_open()?;
        let name = schema.name().to_string();
        self.inner.replica.write().cache.create_table(schema)?;
        debug!(table = %name, "table defined");
        Ok(())
    }

    /// Creates a local table from a `CREATE TABLE` statement.
    pub fn schema(&self, text: &str) -> Result<()> {
        match parse(text)? {
            Statement::CreateTable(table) => self.define_table(table),
            _ => Err(tarn_core::Error::invalid_operation("Expected CREATE TABLE").into()),
        }
    }

    /// Schema of a local table.
    pub fn table_schema(&self, name: &str) -> Result<Table> {
        Ok(self.inner.replica.read().cache.table(name)?.schema().clone())
    }

    /// Names of the local tables.
    pub fn tables(&self) -> Vec<String> {
        let replica = self.inner.replica.read();
        replica
            .cache
            .table_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Evaluates a SELECT once against the local rows, pending writes
    /// included.
    pub fn run_query(&self, text: &str, binding: &Binding) -> Result<ResultSet> {
        self.ensure_open()?;
        let descriptor = QueryDescriptor::prepare(text)?;
        let replica = self.inner.replica.read();
        Ok(evaluate(&descriptor, binding, &replica.cache)?)
    }

    /// Registers a live query. The initial result is available right away
    /// through [`subscription_result`](Self::subscription_result);
    /// `on_change` receives every later change of it.
    pub fn subscribe_query<F>(
        &self,
        text: &str,
        binding: Binding,
        on_change: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(&ResultSet) + Send + Sync + 'static,
    {
        self.ensure_open()?;
        let descriptor = QueryDescriptor::prepare(text)?;
        let replica = self.inner.replica.read();
        let mut registry = self.inner.registry.lock();
        let handle = registry.subscribe(descriptor, binding, on_change, &replica.cache)?;
        debug!(subscription = handle.id(), "subscribed");
        Ok(handle)
    }

    /// Replaces a subscription's parameters. The callback runs if the result
    /// changes.
    pub fn rebind(&self, handle: SubscriptionHandle, binding: Binding) -> Result<()> {
        self.ensure_open()?;
        let notification = {
            let replica = self.inner.replica.read();
            let mut registry = self.inner.registry.lock();
            registry.rebind(handle, binding, &replica.cache)?
        };
        self.inner.fire(notification.into_iter().collect());
        Ok(())
    }

    /// Cancels a subscription. Returns false if it was not live.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.inner.registry.lock().unsubscribe(handle)
    }

    /// The last result delivered for a subscription.
    pub fn subscription_result(&self, handle: SubscriptionHandle) -> Option<ResultSet> {
        self.inner.registry.lock().result(handle).cloned()
    }

    /// Applies an INSERT, UPDATE or DELETE locally and logs it for the remote.
    ///
    /// Subscriptions whose results change are notified before this returns.
    /// While mirroring, the logged mutations are then forwarded; a transport
    /// failure does not fail the call.
    ///
    /// An INSERT that leaves its integer key to be allocated may later be
    /// moved to another key if the remote already has a row with the one
    /// reported in `inserted_key`.
    pub fn mutate(&self, text: &str, binding: &Binding) -> Result<MutationOutcome> {
        if self.inner.in_callback() {
            return Err(Error::ReentrantMutation);
        }
        self.ensure_open()?;
        let statement = MutationStatement::prepare(text)?;

        let (outcome, failure) = {
            let _writer = self.inner.writer.lock();
            let mut replica = self.inner.replica.write();
            let store = replica.cache.table_mut(statement.table())?;
            let allocated = statement.allocates_key(binding, store.schema());
            let mutations = statement.plan(binding, store)?;
            let applied = replica.apply_local(statement.table(), mutations, allocated);

            let outcome = MutationOutcome {
                affected_rows: applied.sequences.len(),
                sequences: applied.sequences,
                inserted_key: applied.inserted_key,
            };
            let notifications = match applied.affected {
                Some(affected) => self
                    .inner
                    .collect(RwLockWriteGuard::downgrade(replica), &[affected]),
                None => Vec::new(),
            };
            self.inner.fire(notifications);
            (outcome, applied.error)
        };

        if !outcome.sequences.is_empty() {
            self.flush();
        }
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(outcome),
        }
    }

    /// Local mutations not yet acknowledged by the remote, in sequence order.
    pub fn pending_mutations(&self) -> Vec<LogEntry> {
        self.inner.replica.read().log.pending().cloned().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.replica.read().log.len()
    }

    /// Starts mirroring `tables` from a remote store.
    ///
    /// Connects, loads a snapshot of every table, replays pending local
    /// mutations on top and then forwards them. If a snapshot cannot be
    /// fetched the replica returns to `Uninitialized` with its rows
    /// untouched. If the channel cannot connect the replica stays
    /// `Disconnected` and [`reconnect`](Self::reconnect) can be retried.
    pub fn mirror(&self, channel: Arc<dyn SyncChannel>, tables: &[&str]) -> Result<()> {
        if self.inner.in_callback() {
            return Err(Error::ReentrantMutation);
        }
        self.ensure_open()?;
        {
            let replica = self.inner.replica.read();
            for table in tables {
                replica.cache.table(table)?;
            }
        }
        {
            let phase = self.inner.phase.lock();
            if phase.is_attached() {
                return Err(tarn_core::Error::invalid_operation(format!(
                    "Replica is already {}",
                    *phase
                ))
                .into());
            }
        }
        self.set_state(MirrorState::Loading);
        let names: Vec<String> = tables.iter().map(|t| t.to_string()).collect();
        *self.inner.channel.lock() = Some(channel.clone());
        *self.inner.mirrored.lock() = names.clone();
        self.inner.needs_snapshot.store(true, Ordering::SeqCst);
        self.begin_load(&names);
        info!(client = %self.inner.config.client_id, ?tables, "mirroring");

        if let Err(e) = self.connect(channel.as_ref()) {
            self.abort_load(&names, false);
            self.set_state(MirrorState::Disconnected);
            return Err(e);
        }
        if let Err(e) = self.load_snapshots(channel.as_ref(), &names) {
            channel.disconnect();
            self.abort_load(&names, false);
            *self.inner.channel.lock() = None;
            self.inner.mirrored.lock().clear();
            self.set_state(MirrorState::Uninitialized);
            return Err(e);
        }
        self.inner.needs_snapshot.store(false, Ordering::SeqCst);
        self.go_live();
        Ok(())
    }

    /// Reconnects a disconnected mirror and resends pending mutations.
    pub fn reconnect(&self) -> Result<()> {
        if self.inner.in_callback() {
            return Err(Error::ReentrantMutation);
        }
        self.ensure_open()?;
        let channel = self.current_channel()?;
        match self.connect(channel.as_ref()) {
            Ok(resume) => self.resume(resume),
            Err(e) => {
                self.set_state(MirrorState::Disconnected);
                Err(e)
            }
        }
    }

    /// Cancels every subscription and drops the channel. Irreversible; later
    /// calls fail with `Closed`.
    pub fn close(&self) {
        {
            let mut phase = self.inner.phase.lock();
            if *phase == MirrorState::Closed {
                return;
            }
            *phase = MirrorState::Closed;
        }
        self.inner.registry.lock().clear();
        let channel = self.inner.channel.lock().take();
        if let Some(channel) = channel {
            channel.disconnect();
        }
        info!(client = %self.inner.config.client_id, "replica closed");
    }

    fn current_channel(&self) -> Result<Arc<dyn SyncChannel>> {
        self.inner
            .channel
            .lock()
            .clone()
            .ok_or_else(|| tarn_core::Error::invalid_operation("Replica is not mirrored").into())
    }

    fn event_sink(&self) -> EventSink {
        let weak = Arc::downgrade(&self.inner);
        EventSink::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                LocalDb { inner }.handle_event(event);
            }
        })
    }

    fn connect(&self, channel: &dyn SyncChannel) -> Result<Resume> {
        let attempts = self.inner.config.connect_attempts.max(1);
        let mut attempt = 1;
        loop {
            match channel.connect(self.event_sink()) {
                Ok(resume) => return Ok(resume),
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "connect failed");
                    if attempt >= attempts {
                        return Err(e.into());
                    }
                    thread::sleep(self.inner.config.backoff(attempt));
                    attempt += 1;
                }
            }
        }
    }

    fn fetch_snapshot(&self, channel: &dyn SyncChannel, table: &str) -> Result<Vec<RemoteRow>> {
        let attempts = self.inner.config.snapshot_attempts.max(1);
        for attempt in 1..=attempts {
            match channel.request_snapshot(table) {
                Ok(rows) => return Ok(rows),
                Err(e) => {
                    warn!(table, attempt, attempts, error = %e, "snapshot request failed");
                    if attempt < attempts {
                        thread::sleep(self.inner.config.backoff(attempt));
                    }
                }
            }
        }
        Err(Error::Snapshot {
            table: table.to_string(),
            attempts,
        })
    }

    /// Queues deltas for `tables` until their snapshots are installed.
    fn begin_load(&self, tables: &[String]) {
        let _writer = self.inner.writer.lock();
        self.inner
            .replica
            .write()
            .begin_load(tables.iter().map(String::as_str));
    }

    /// Ends a load that installed no snapshot. Queued deltas are merged if
    /// `keep` is set.
    fn abort_load(&self, tables: &[String], keep: bool) {
        let _writer = self.inner.writer.lock();
        let mut replica = self.inner.replica.write();
        let affected = replica.abort_load(tables, keep);
        if affected.is_empty() {
            return;
        }
        let notifications = self
            .inner
            .collect(RwLockWriteGuard::downgrade(replica), &affected);
        self.inner.fire(notifications);
    }

    /// Fetches every snapshot first, so a failure leaves the rows untouched.
    fn load_snapshots(&self, channel: &dyn SyncChannel, tables: &[String]) -> Result<()> {
        let mut snapshots = Vec::with_capacity(tables.len());
        for table in tables {
            snapshots.push((table.to_string(), self.fetch_snapshot(channel, table)?));
        }
        self.install_snapshots(snapshots)
    }

    fn install_snapshots(&self, snapshots: Vec<(String, Vec<RemoteRow>)>) -> Result<()> {
        let _writer = self.inner.writer.lock();
        let mut replica = self.inner.replica.write();
        let mut loaded = Vec::with_capacity(snapshots.len());
        let mut failure = None;
        for (table, rows) in snapshots {
            match replica.load_snapshot(&table, rows) {
                Ok(_) => loaded.push(table),
                Err(e) => {
                    warn!(table = %table, error = %e, "snapshot rows do not fit the local schema");
                    failure = Some(e);
                    break;
                }
            }
        }

        let replica = RwLockWriteGuard::downgrade(replica);
        let notifications = {
            let mut registry = self.inner.registry.lock();
            let mut notifications = Vec::new();
            for table in &loaded {
                notifications.extend(registry.refresh_table(table, &replica.cache));
            }
            notifications
        };
        drop(replica);
        self.inner.fire(notifications);
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn resume(&self, resume: Resume) -> Result<()> {
        let channel = self.current_channel()?;
        if resume == Resume::SnapshotRequired {
            self.inner.needs_snapshot.store(true, Ordering::SeqCst);
        }
        if self.inner.needs_snapshot.load(Ordering::SeqCst) {
            let tables = self.inner.mirrored.lock().clone();
            self.set_state(MirrorState::Loading);
            self.begin_load(&tables);
            if let Err(e) = self.load_snapshots(channel.as_ref(), &tables) {
                self.abort_load(&tables, true);
                self.set_state(MirrorState::Disconnected);
                return Err(e);
            }
            self.inner.needs_snapshot.store(false, Ordering::SeqCst);
        }
        self.go_live();
        Ok(())
    }

    fn go_live(&self) {
        {
            let mut outbound = self.inner.outbound.lock();
            outbound.last_sent = self.inner.replica.read().log.acked_through();
        }
        self.set_state(MirrorState::Mirroring);
        self.flush();
    }

    /// Forwards pending mutations in sequence order.
    fn flush(&self) {
        let mut outbound = self.inner.outbound.lock();
        let mut rekeys = 0;
        loop {
            if self.state() != MirrorState::Mirroring {
                return;
            }
            let Some(channel) = self.inner.channel.lock().clone() else {
                return;
            };
            let next = self
                .inner
                .replica
                .read()
                .log
                .pending_after(outbound.last_sent)
                .next()
                .cloned();
            let Some(entry) = next else {
                return;
            };

            match channel.send_mutation(&entry) {
                Ok(Ack::Confirmed) => {
                    outbound.last_sent = entry.seq;
                    self.acknowledge(entry.seq);
                }
                Ok(Ack::Deferred) => outbound.last_sent = entry.seq,
                Err(SendError::KeyConflict { reason })
                    if entry.allocated_key && rekeys < MAX_REKEYS =>
                {
                    debug!(seq = entry.seq, table = %entry.table, %reason, "allocated key taken on remote");
                    rekeys += 1;
                    if !self.rekey(&entry) {
                        self.reject(channel.as_ref(), &entry);
                    }
                }
                Err(SendError::Rejected { reason } | SendError::KeyConflict { reason }) => {
                    warn!(seq = entry.seq, table = %entry.table, %reason, "mutation rejected by remote");
                    self.reject(channel.as_ref(), &entry);
                }
                Err(SendError::Transport(e)) => {
                    warn!(seq = entry.seq, error = %e, "send failed");
                    self.set_state(MirrorState::Disconnected);
                    return;
                }
            }
        }
    }

    /// Moves an insert refused for its allocated key to a fresh one, so the
    /// next send carries the new key. Returns false if it cannot be moved.
    fn rekey(&self, entry: &LogEntry) -> bool {
        let _writer = self.inner.writer.lock();
        let mut replica = self.inner.replica.write();
        let Some((key, affected)) = replica.rekey(entry.seq) else {
            return false;
        };
        info!(
            seq = entry.seq,
            table = %entry.table,
            from = %entry.mutation.key(),
            to = %key,
            "pending insert moved to a new key"
        );
        let notifications = self
            .inner
            .collect(RwLockWriteGuard::downgrade(replica), &affected);
        self.inner.fire(notifications);
        true
    }

    /// Drops a refused entry and reloads its table so the optimistic rows
    /// converge to the remote ones.
    fn reject(&self, channel: &dyn SyncChannel, entry: &LogEntry) {
        {
            let _writer = self.inner.writer.lock();
            let mut replica = self.inner.replica.write();
            let affected = replica.reject(entry.seq);
            let notifications = self
                .inner
                .collect(RwLockWriteGuard::downgrade(replica), &affected);
            self.inner.fire(notifications);
        }
        let tables = vec![entry.table.clone()];
        self.begin_load(&tables);
        let resync = self
            .fetch_snapshot(channel, &entry.table)
            .and_then(|rows| self.install_snapshots(vec![(entry.table.clone(), rows)]));
        if let Err(e) = resync {
            warn!(table = %entry.table, error = %e, "resync after rejection failed");
            self.abort_load(&tables, true);
        }
    }

    fn acknowledge(&self, through: SequenceNumber) {
        let _writer = self.inner.writer.lock();
        let mut replica = self.inner.replica.write();
        let affected = replica.acknowledge(through);
        if affected.is_empty() {
            return;
        }
        let notifications = self
            .inner
            .collect(RwLockWriteGuard::downgrade(replica), &affected);
        self.inner.fire(notifications);
    }

    fn apply_delta(&self, delta: RemoteDelta) {
        let _writer = self.inner.writer.lock();
        let mut replica = self.inner.replica.write();
        let affected = match replica.reconcile(delta) {
            Reconciled::Applied(affected) => affected,
            Reconciled::Deferred
            | Reconciled::Queued
            | Reconciled::Duplicate
            | Reconciled::Ignored => return,
        };
        let notifications = self
            .inner
            .collect(RwLockWriteGuard::downgrade(replica), &[affected]);
        self.inner.fire(notifications);
    }

    fn handle_event(&self, event: ChannelEvent) {
        if self.state() == MirrorState::Closed {
            return;
        }
        match event {
            ChannelEvent::Delta(delta) => self.apply_delta(delta),
            ChannelEvent::Acked { through } => self.acknowledge(through),
            ChannelEvent::Disconnected { reason } => {
                warn!(client = %self.inner.config.client_id, %reason, "channel disconnected");
                let attached = matches!(
                    self.state(),
                    MirrorState::Mirroring | MirrorState::Loading
                );
                if attached {
                    self.set_state(MirrorState::Disconnected);
                }
            }
            ChannelEvent::Reconnected(resume) => {
                if let Err(e) = self.resume(resume) {
                    warn!(error = %e, "resume after reconnect failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::TransportError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TASKS: &str = "CREATE TABLE tasks (id INTEGER PRIMARY KEY, name TEXT, complete INTEGER)";

    fn db() -> LocalDb {
        let db = LocalDb::new();
        db.schema(TASKS).unwrap();
        db
    }

    /// A channel that refuses every connection.
    struct Unreachable;

    impl SyncChannel for Unreachable {
        fn connect(&self, _events: EventSink) -> std::result::Result<Resume, TransportError> {
            Err(TransportError::new("unreachable"))
        }

        fn request_snapshot(
            &self,
            _table: &str,
        ) -> std::result::Result<Vec<RemoteRow>, TransportError> {
            Err(TransportError::new("unreachable"))
        }

        fn send_mutation(&self, _entry: &LogEntry) -> std::result::Result<Ack, SendError> {
            Err(TransportError::new("unreachable").into())
        }

        fn disconnect(&self) {}
    }

    #[test]
    fn test_callback_scope_is_per_replica() {
        assert!(!CallbackScope::active(1));
        {
            let _outer = CallbackScope::enter(1);
            {
                let _inner = CallbackScope::enter(1);
                let _other = CallbackScope::enter(2);
                assert!(CallbackScope::active(1));
                assert!(CallbackScope::active(2));
            }
            assert!(CallbackScope::active(1));
            assert!(!CallbackScope::active(2));
        }
        assert!(!CallbackScope::active(1));
    }

    #[test]
    fn test_callback_may_write_to_another_replica() {
        let source = db();
        let copy = db();
        let writer = copy.clone();
        let reentrant = source.clone();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = errors.clone();
        source
            .subscribe_query("SELECT name FROM tasks", Binding::new(), move |result: &ResultSet| {
                for name in result.column_values("name") {
                    let binding = Binding::new().with("name", name.clone());
                    if let Err(e) =
                        writer.mutate("INSERT INTO tasks (name, complete) VALUES (@name, 0)", &binding)
                    {
                        seen.lock().push(e.to_string());
                    }
                }
                if reentrant.mutate("DELETE FROM tasks", &Binding::new()).is_ok() {
                    seen.lock().push("own replica accepted a write".to_string());
                }
            })
            .unwrap();

        source
            .mutate("INSERT INTO tasks (name, complete) VALUES ('buy milk', 0)", &Binding::new())
            .unwrap();
        let errors = errors.lock().clone();
        assert!(errors.is_empty(), "{:?}", errors);
        let copied = copy.run_query("SELECT name FROM tasks", &Binding::new()).unwrap();
        assert_eq!(copied.column_values("name"), vec![&Value::from("buy milk")]);
        assert_eq!(source.pending_count(), 1);
    }

    #[test]
    fn test_mutate_reports_outcome() {
        let db = db();
        let insert = db
            .mutate(
                "INSERT INTO tasks (name, complete) VALUES (@name, 0)",
                &Binding::new().with("name", "buy milk"),
            )
            .unwrap();
        assert_eq!(insert.affected_rows, 1);
        assert_eq!(insert.sequences, vec![1]);
        assert_eq!(insert.inserted_key, Some(Value::Int64(1)));

        let update = db
            .mutate("UPDATE tasks SET complete = 1 WHERE complete = 7", &Binding::new())
            .unwrap();
        assert_eq!(update, MutationOutcome::default());
        assert_eq!(db.pending_count(), 1);
    }

    #[test]
    fn test_schema_rejects_other_statements() {
        let db = LocalDb::new();
        assert!(db.schema("SELECT * FROM tasks").is_err());
        assert!(db.tables().is_empty());
    }

    #[test]
    fn test_rebind_notifies() {
        let db = db();
        db.mutate("INSERT INTO tasks (id, name, complete) VALUES (1, 'a', 1)", &Binding::new())
            .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let handle = db
            .subscribe_query(
                "SELECT * FROM tasks WHERE complete = @c",
                Binding::new().with("c", 0i64),
                move |_: &ResultSet| {
                    seen.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();
        assert_eq!(db.subscription_result(handle).map(|r| r.len()), Some(0));

        db.rebind(handle, Binding::new().with("c", 1i64)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(db.subscription_result(handle).map(|r| r.len()), Some(1));

        assert!(db.rebind(handle, Binding::new()).is_err());
        assert_eq!(db.subscription_result(handle).map(|r| r.len()), Some(1));
    }

    #[test]
    fn test_connect_failure_leaves_disconnected() {
        let db = LocalDb::with_config(
            MirrorConfig::default()
                .with_connect_attempts(2)
                .with_retry_backoff_ms(0),
        );
        db.schema(TASKS).unwrap();
        assert!(matches!(
            db.mirror(Arc::new(Unreachable), &["tasks"]),
            Err(Error::Transport(_))
        ));
        assert_eq!(db.state(), MirrorState::Disconnected);

        // Local writes keep working.
        db.mutate("INSERT INTO tasks (id, name, complete) VALUES (1, 'a', 0)", &Binding::new())
            .unwrap();
        assert!(db.reconnect().is_err());
        assert_eq!(db.pending_count(), 1);
    }

    #[test]
    fn test_mirror_requires_known_tables() {
        let db = db();
        assert!(matches!(
            db.mirror(Arc::new(Unreachable), &["users"]),
            Err(Error::Store(tarn_core::Error::TableNotFound { .. }))
        ));
        assert_eq!(db.state(), MirrorState::Uninitialized);
        assert!(db.reconnect().is_err());
    }

    #[test]
    fn test_closed_replica_refuses_work() {
        let db = db();
        db.close();
        db.close();
        assert_eq!(db.state(), MirrorState::Closed);
        assert!(matches!(
            db.run_query("SELECT * FROM tasks", &Binding::new()),
            Err(Error::Closed)
        ));
        assert!(matches!(
            db.mutate("DELETE FROM tasks", &Binding::new()),
            Err(Error::Closed)
        ));
    }
}
