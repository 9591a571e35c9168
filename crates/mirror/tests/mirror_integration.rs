//! End-to-end tests for replicas mirrored over the loopback remote.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use tarn_core::schema::Table;
use tarn_core::{Row, Value};
use tarn_mirror::{
    Ack, ChannelEvent, Error, EventSink, LocalDb, LoopbackRemote, MirrorConfig, MirrorState,
    RemoteDelta, RemoteRow, Resume, SendError, SyncChannel, TransportError,
};
use tarn_query::{parse, Binding, ResultSet, Statement};
use tarn_storage::{ColumnDelta, LogEntry, Mutation};
use tracing_subscriber::EnvFilter;

const TASKS: &str = "CREATE TABLE tasks (id INTEGER PRIMARY KEY, name TEXT, complete INTEGER)";
const BY_COMPLETE: &str = "SELECT * FROM tasks WHERE complete = @completed";
const INSERT: &str = "INSERT INTO tasks (id, name, complete) VALUES (@id, @name, @complete)";
const SET_COMPLETE: &str = "UPDATE tasks SET complete = @completed WHERE id = @id";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn tasks_schema() -> Table {
    match parse(TASKS).unwrap() {
        Statement::CreateTable(table) => table,
        _ => panic!("expected CREATE TABLE"),
    }
}

fn local(client: &str) -> LocalDb {
    init_tracing();
    let db = LocalDb::with_config(
        MirrorConfig::default()
            .with_client_id(client)
            .with_retry_backoff_ms(0),
    );
    db.define_table(tasks_schema()).unwrap();
    db
}

fn remote() -> LoopbackRemote {
    let remote = LoopbackRemote::new();
    remote.create_table(tasks_schema());
    remote
}

fn mirrored(remote: &LoopbackRemote, client: &str) -> LocalDb {
    let db = local(client);
    db.mirror(remote.channel(client), &["tasks"]).unwrap();
    assert_eq!(db.state(), MirrorState::Mirroring);
    db
}

fn task(id: i64, name: &str, complete: i64) -> Binding {
    Binding::new()
        .with("id", id)
        .with("name", name)
        .with("complete", complete)
}

fn set_complete(id: &Value, completed: i64) -> Binding {
    Binding::new()
        .with("id", id.clone())
        .with("completed", completed)
}

fn completed(value: i64) -> Binding {
    Binding::new().with("completed", value)
}

fn complete_of(db: &LocalDb, id: i64) -> Option<i64> {
    db.run_query(
        "SELECT complete FROM tasks WHERE id = @id",
        &Binding::new().with("id", id),
    )
    .unwrap()
    .get(0, "complete")
    .and_then(Value::as_i64)
}

/// Collects every result a subscription delivers.
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<ResultSet>>>);

impl Recorder {
    fn callback(&self) -> impl Fn(&ResultSet) + Send + Sync + 'static {
        let results = self.0.clone();
        move |rs: &ResultSet| results.lock().push(rs.clone())
    }

    fn calls(&self) -> usize {
        self.0.lock().len()
    }

    fn last(&self) -> Option<ResultSet> {
        self.0.lock().last().cloned()
    }
}

#[test]
fn test_buy_milk_lifecycle() {
    let db = local("local");
    let open = Recorder::default();
    let done = Recorder::default();
    let open_sub = db.subscribe_query(BY_COMPLETE, completed(0), open.callback()).unwrap();
    let done_sub = db.subscribe_query(BY_COMPLETE, completed(1), done.callback()).unwrap();

    let key = db
        .mutate(
            "INSERT INTO tasks (name, complete) VALUES (@name, 0)",
            &Binding::new().with("name", "buy milk"),
        )
        .unwrap()
        .inserted_key
        .unwrap();
    assert_eq!(open.calls(), 1);
    assert_eq!(done.calls(), 0);
    assert_eq!(
        open.last().unwrap().get(0, "name"),
        Some(&Value::from("buy milk"))
    );

    db.mutate(SET_COMPLETE, &set_complete(&key, 1)).unwrap();
    assert_eq!(open.calls(), 2);
    assert!(open.last().unwrap().is_empty());
    assert_eq!(done.calls(), 1);
    assert_eq!(done.last().unwrap().len(), 1);

    db.mutate("DELETE FROM tasks WHERE id = @id", &Binding::new().with("id", key))
        .unwrap();
    assert_eq!(open.calls(), 2);
    assert_eq!(done.calls(), 2);
    assert!(done.last().unwrap().is_empty());

    assert_eq!(db.subscription_result(open_sub), Some(open.last().unwrap()));
    assert_eq!(db.subscription_result(done_sub), Some(done.last().unwrap()));
    assert_eq!(db.pending_count(), 3);
}

#[test]
fn test_insert_notifies_only_matching_subscription() {
    let db = local("local");
    let open = Recorder::default();
    let done = Recorder::default();
    db.subscribe_query(BY_COMPLETE, completed(0), open.callback()).unwrap();
    db.subscribe_query(BY_COMPLETE, completed(1), done.callback()).unwrap();

    db.mutate(INSERT, &task(1, "buy milk", 0)).unwrap();
    assert_eq!(open.calls(), 1);
    assert_eq!(done.calls(), 0);
}

#[test]
fn test_unaffected_subscription_is_not_notified() {
    let db = local("local");
    db.mutate(INSERT, &task(1, "buy milk", 0)).unwrap();
    let names = Recorder::default();
    let sub = db
        .subscribe_query(
            "SELECT id, name FROM tasks WHERE complete = 0",
            Binding::new(),
            names.callback(),
        )
        .unwrap();

    db.mutate(INSERT, &task(2, "walk dog", 1)).unwrap();
    db.mutate(SET_COMPLETE, &set_complete(&Value::Int64(2), 2)).unwrap();
    assert_eq!(names.calls(), 0);
    assert_eq!(db.subscription_result(sub).unwrap().len(), 1);

    assert!(db.unsubscribe(sub));
    db.mutate(SET_COMPLETE, &set_complete(&Value::Int64(1), 1)).unwrap();
    assert_eq!(names.calls(), 0);
    assert!(!db.unsubscribe(sub));
}

#[test]
fn test_group_counts_ascending() {
    let db = local("local");
    for (id, complete) in [(1, 1), (2, 0), (3, 1), (4, 0), (5, 0)] {
        db.mutate(INSERT, &task(id, "t", complete)).unwrap();
    }
    let rs = db
        .run_query(
            "SELECT complete, count(*) FROM tasks GROUP BY complete",
            &Binding::new(),
        )
        .unwrap();
    assert_eq!(rs.columns(), &["complete", "count"]);
    assert_eq!(
        rs.rows(),
        &[
            vec![Value::Int64(0), Value::Int64(3)],
            vec![Value::Int64(1), Value::Int64(2)],
        ]
    );
}

#[test]
fn test_read_your_writes_before_ack() {
    let remote = remote();
    let db = mirrored(&remote, "a");
    remote.defer_acks(true);

    let outcome = db.mutate(INSERT, &task(1, "buy milk", 0)).unwrap();
    assert_eq!(outcome.sequences, vec![1]);
    assert_eq!(db.pending_count(), 1);
    assert_eq!(complete_of(&db, 1), Some(0));
    assert_eq!(remote.rows("tasks").len(), 1);

    remote.release_acks();
    assert_eq!(db.pending_count(), 0);
    assert_eq!(complete_of(&db, 1), Some(0));
}

#[test]
fn test_pending_write_wins_until_acknowledged() {
    let remote = remote();
    remote
        .insert(
            "tasks",
            vec![Value::Int64(1), Value::from("buy milk"), Value::Int64(0)],
        )
        .unwrap();
    let a = mirrored(&remote, "a");
    let b = mirrored(&remote, "b");
    assert_eq!(complete_of(&a, 1), Some(0));
    remote.defer_acks(true);

    let done = Recorder::default();
    a.subscribe_query(BY_COMPLETE, completed(1), done.callback()).unwrap();

    a.mutate(SET_COMPLETE, &set_complete(&Value::Int64(1), 1)).unwrap();
    assert_eq!(done.calls(), 1);
    assert_eq!(complete_of(&b, 1), Some(1));

    // b reopens the task; a keeps showing its own pending write.
    b.mutate(SET_COMPLETE, &set_complete(&Value::Int64(1), 0)).unwrap();
    assert_eq!(complete_of(&a, 1), Some(1));
    assert_eq!(done.calls(), 1);

    // Once acknowledged, a converges to the remote state.
    remote.release_acks();
    assert_eq!(a.pending_count(), 0);
    assert_eq!(b.pending_count(), 0);
    assert_eq!(complete_of(&a, 1), Some(0));
    assert_eq!(complete_of(&b, 1), Some(0));
    assert_eq!(remote.rows("tasks")[0][2], Value::Int64(0));
    assert_eq!(done.calls(), 2);
    assert!(done.last().unwrap().is_empty());
}

#[test]
fn test_redelivered_delta_is_idempotent() {
    let remote = remote();
    let db = mirrored(&remote, "a");
    let open = Recorder::default();
    db.subscribe_query(BY_COMPLETE, completed(0), open.callback()).unwrap();

    let values = vec![Value::Int64(7), Value::from("buy milk"), Value::Int64(0)];
    let version = remote.insert("tasks", values.clone()).unwrap();
    assert_eq!(open.calls(), 1);

    let delta = RemoteDelta {
        table: "tasks".into(),
        mutation: Mutation::Insert(Row::new(Value::Int64(7), values)),
        version,
    };
    remote.redeliver(&delta);
    remote.redeliver(&delta);
    assert_eq!(open.calls(), 1);
    assert_eq!(db.run_query("SELECT * FROM tasks", &Binding::new()).unwrap().len(), 1);
}

#[test]
fn test_offline_writes_resent_on_reconnect() {
    let remote = remote();
    let db = mirrored(&remote, "a");

    remote.drop_connection("a", "network down");
    assert_eq!(db.state(), MirrorState::Disconnected);

    db.mutate(INSERT, &task(1, "buy milk", 0)).unwrap();
    db.mutate(INSERT, &task(2, "walk dog", 0)).unwrap();
    remote
        .insert(
            "tasks",
            vec![Value::Int64(10), Value::from("from elsewhere"), Value::Int64(1)],
        )
        .unwrap();
    assert_eq!(db.pending_count(), 2);
    assert_eq!(remote.rows("tasks").len(), 1);
    assert_eq!(complete_of(&db, 10), None);

    db.reconnect().unwrap();
    assert_eq!(db.state(), MirrorState::Mirroring);
    assert_eq!(db.pending_count(), 0);
    assert_eq!(remote.rows("tasks").len(), 3);
    assert_eq!(remote.client_sequence("a"), 2);
    assert_eq!(complete_of(&db, 10), Some(1));
}

#[test]
fn test_reconnect_reloads_when_snapshot_required() {
    let remote = remote();
    let db = mirrored(&remote, "a");
    let open = Recorder::default();
    db.subscribe_query(BY_COMPLETE, completed(0), open.callback()).unwrap();

    remote.drop_connection("a", "network down");
    db.mutate(INSERT, &task(1, "offline", 0)).unwrap();
    remote
        .insert(
            "tasks",
            vec![Value::Int64(10), Value::from("while away"), Value::Int64(0)],
        )
        .unwrap();
    remote.force_snapshot_resume();
    assert_eq!(open.calls(), 1);

    db.reconnect().unwrap();
    assert_eq!(open.calls(), 2);
    assert_eq!(open.last().unwrap().len(), 2);
    assert_eq!(db.pending_count(), 0);
    assert_eq!(remote.rows("tasks").len(), 2);
}

#[test]
fn test_snapshot_failure_leaves_no_partial_mirror() {
    let remote = remote();
    remote
        .insert(
            "tasks",
            vec![Value::Int64(10), Value::from("remote"), Value::Int64(0)],
        )
        .unwrap();
    let db = local("a");
    db.mutate(INSERT, &task(1, "local", 0)).unwrap();

    remote.fail_snapshots(3);
    let err = db.mirror(remote.channel("a"), &["tasks"]).unwrap_err();
    assert!(matches!(
        err,
        Error::Snapshot { ref table, attempts: 3 } if table == "tasks"
    ));
    assert_eq!(db.state(), MirrorState::Uninitialized);
    assert_eq!(complete_of(&db, 10), None);
    assert_eq!(complete_of(&db, 1), Some(0));
    assert_eq!(db.pending_count(), 1);

    db.mirror(remote.channel("a"), &["tasks"]).unwrap();
    assert_eq!(db.state(), MirrorState::Mirroring);
    assert_eq!(complete_of(&db, 10), Some(0));
    assert_eq!(db.pending_count(), 0);
    assert_eq!(remote.rows("tasks").len(), 2);
}

/// Serves a snapshot of one open task and, while that snapshot is in flight,
/// pushes the newer change that completes it.
#[derive(Default)]
struct RacingSnapshot {
    events: Mutex<Option<EventSink>>,
}

impl RacingSnapshot {
    fn completed_delta(table: &str) -> RemoteDelta {
        RemoteDelta {
            table: table.to_string(),
            mutation: Mutation::update(1i64, vec![ColumnDelta::new("complete", 1i64)]),
            version: 2,
        }
    }

    fn emit(&self, event: ChannelEvent) {
        let events = self.events.lock().clone();
        if let Some(events) = events {
            events.emit(event);
        }
    }
}

impl SyncChannel for RacingSnapshot {
    fn connect(&self, events: EventSink) -> Result<Resume, TransportError> {
        *self.events.lock() = Some(events);
        Ok(Resume::Incremental)
    }

    fn request_snapshot(&self, table: &str) -> Result<Vec<RemoteRow>, TransportError> {
        self.emit(ChannelEvent::Delta(Self::completed_delta(table)));
        Ok(vec![RemoteRow {
            values: vec![Value::Int64(1), Value::from("buy milk"), Value::Int64(0)],
            version: 1,
        }])
    }

    fn send_mutation(&self, _entry: &LogEntry) -> Result<Ack, SendError> {
        Ok(Ack::Confirmed)
    }

    fn disconnect(&self) {
        self.events.lock().take();
    }
}

#[test]
fn test_delta_arriving_during_snapshot_load_is_kept() {
    let db = local("a");
    let done = Recorder::default();
    db.subscribe_query(BY_COMPLETE, completed(1), done.callback()).unwrap();

    let channel = Arc::new(RacingSnapshot::default());
    db.mirror(channel.clone(), &["tasks"]).unwrap();
    assert_eq!(db.state(), MirrorState::Mirroring);
    assert_eq!(complete_of(&db, 1), Some(1));
    assert_eq!(done.calls(), 1);
    assert_eq!(done.last().unwrap().len(), 1);

    // Delivered again: already applied.
    channel.emit(ChannelEvent::Delta(RacingSnapshot::completed_delta("tasks")));
    assert_eq!(complete_of(&db, 1), Some(1));
    assert_eq!(done.calls(), 1);
}

#[test]
fn test_offline_insert_moves_off_a_key_taken_elsewhere() {
    const ADD: &str = "INSERT INTO tasks (name, complete) VALUES (@name, 0)";
    let name = |n: &str| Binding::new().with("name", n);
    let remote = remote();
    let a = mirrored(&remote, "a");
    let b = mirrored(&remote, "b");

    remote.drop_connection("a", "network down");
    let offline = a.mutate(ADD, &name("a's offline task")).unwrap();
    assert_eq!(offline.inserted_key, Some(Value::Int64(1)));
    let online = b.mutate(ADD, &name("b's task")).unwrap();
    assert_eq!(online.inserted_key, Some(Value::Int64(1)));

    let all = Recorder::default();
    a.subscribe_query("SELECT name FROM tasks", Binding::new(), all.callback())
        .unwrap();

    a.reconnect().unwrap();
    assert_eq!(a.state(), MirrorState::Mirroring);
    assert_eq!(a.pending_count(), 0);
    assert_eq!(remote.client_sequence("a"), 1);
    assert_eq!(
        remote.rows("tasks"),
        vec![
            vec![Value::Int64(1), Value::from("b's task"), Value::Int64(0)],
            vec![Value::Int64(2), Value::from("a's offline task"), Value::Int64(0)],
        ]
    );

    let by_id = "SELECT id, name FROM tasks ORDER BY id";
    for db in [&a, &b] {
        let rs = db.run_query(by_id, &Binding::new()).unwrap();
        assert_eq!(
            rs.rows(),
            &[
                vec![Value::Int64(1), Value::from("b's task")],
                vec![Value::Int64(2), Value::from("a's offline task")],
            ]
        );
    }
    assert_eq!(all.last().unwrap().len(), 2);
}

#[test]
fn test_mirror_twice_is_refused() {
    let remote = remote();
    let db = mirrored(&remote, "a");
    assert!(matches!(
        db.mirror(remote.channel("a"), &["tasks"]),
        Err(Error::Store(tarn_core::Error::InvalidOperation { .. }))
    ));
}

#[test]
fn test_mutation_inside_callback_fails() {
    let db = local("local");
    let outcome = Arc::new(Mutex::new(None));
    let inner_db = db.clone();
    let seen = outcome.clone();
    db.subscribe_query(BY_COMPLETE, completed(0), move |_: &ResultSet| {
        let nested = inner_db.mutate(INSERT, &task(99, "nested", 0));
        let visible = inner_db
            .run_query("SELECT * FROM tasks", &Binding::new())
            .map(|rs| rs.len());
        *seen.lock() = Some((matches!(nested, Err(Error::ReentrantMutation)), visible.ok()));
    })
    .unwrap();

    db.mutate(INSERT, &task(1, "buy milk", 0)).unwrap();
    assert_eq!(*outcome.lock(), Some((true, Some(1))));
    assert_eq!(db.pending_count(), 1);

    // Drops the callback and with it the clone it holds.
    db.close();
}

#[test]
fn test_close_from_callback_stops_later_callbacks() {
    let db = local("local");
    let closer = db.clone();
    db.subscribe_query(BY_COMPLETE, completed(0), move |_: &ResultSet| closer.close())
        .unwrap();
    let later = Recorder::default();
    db.subscribe_query(BY_COMPLETE, completed(0), later.callback()).unwrap();

    db.mutate(INSERT, &task(1, "buy milk", 0)).unwrap();
    assert_eq!(later.calls(), 0);
    assert_eq!(db.state(), MirrorState::Closed);
    assert!(matches!(
        db.run_query("SELECT * FROM tasks", &Binding::new()),
        Err(Error::Closed)
    ));
}

#[test]
fn test_close_detaches_from_remote() {
    let remote = remote();
    let db = mirrored(&remote, "a");
    let open = Recorder::default();
    db.subscribe_query(BY_COMPLETE, completed(0), open.callback()).unwrap();

    db.close();
    remote
        .insert(
            "tasks",
            vec![Value::Int64(1), Value::from("after close"), Value::Int64(0)],
        )
        .unwrap();
    assert_eq!(open.calls(), 0);
    assert!(matches!(db.reconnect(), Err(Error::Closed)));
}

#[test]
fn test_rejected_mutation_resyncs_table() {
    let remote = remote();
    remote
        .insert(
            "tasks",
            vec![Value::Int64(1), Value::from("buy milk"), Value::Int64(0)],
        )
        .unwrap();
    let db = mirrored(&remote, "a");
    let open = Recorder::default();
    db.subscribe_query(BY_COMPLETE, completed(0), open.callback()).unwrap();

    remote.reject_next("read only");
    db.mutate(SET_COMPLETE, &set_complete(&Value::Int64(1), 1)).unwrap();

    assert_eq!(db.pending_count(), 0);
    assert_eq!(complete_of(&db, 1), Some(0));
    assert_eq!(db.state(), MirrorState::Mirroring);
    // Hidden by the optimistic write, then restored by the resync.
    assert_eq!(open.calls(), 2);
    assert_eq!(open.last().unwrap().len(), 1);
}

#[test]
fn test_concurrent_replicas_converge() {
    let remote = remote();
    let a = mirrored(&remote, "a");
    let b = mirrored(&remote, "b");

    let writers: Vec<_> = [(a.clone(), 1i64), (b.clone(), 101i64)]
        .into_iter()
        .map(|(db, base)| {
            thread::spawn(move || {
                for id in base..base + 20 {
                    db.mutate(INSERT, &task(id, "task", id % 2)).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let count = "SELECT count(*) FROM tasks";
    for db in [&a, &b] {
        let rs = db.run_query(count, &Binding::new()).unwrap();
        assert_eq!(rs.get(0, "count"), Some(&Value::Int64(40)));
        assert_eq!(db.pending_count(), 0);
    }
    assert_eq!(remote.rows("tasks").len(), 40);
}
