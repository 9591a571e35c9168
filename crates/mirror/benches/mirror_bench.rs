//! Benchmarks for writes through a mirrored replica.
//!
//! Compares a local-only mutation with one that is forwarded, echoed back
//! and acknowledged over the loopback remote.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tarn_mirror::{LocalDb, LoopbackRemote};
use tarn_query::{Binding, ResultSet};

const TASKS: &str = "CREATE TABLE tasks (id INTEGER PRIMARY KEY, name TEXT, complete INTEGER)";

fn replica(rows: i64) -> LocalDb {
    let db = LocalDb::new();
    db.schema(TASKS).unwrap();
    for id in 0..rows {
        db.mutate(
            "INSERT INTO tasks (id, name, complete) VALUES (@id, @name, 0)",
            &Binding::new()
                .with("id", id)
                .with("name", format!("task {}", id)),
        )
        .unwrap();
    }
    db.subscribe_query(
        "SELECT * FROM tasks WHERE complete = @completed",
        Binding::new().with("completed", 1i64),
        |_: &ResultSet| {},
    )
    .unwrap();
    db
}

fn toggle(db: &LocalDb, flip: &mut i64) {
    *flip ^= 1;
    let outcome = db
        .mutate(
            "UPDATE tasks SET complete = @completed WHERE id = 7",
            &Binding::new().with("completed", *flip),
        )
        .unwrap();
    black_box(outcome);
}

fn bench_mutate(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutate");

    let local = replica(1_000);
    let mut flip = 0i64;
    group.bench_function("local", |b| b.iter(|| toggle(&local, &mut flip)));

    let remote = LoopbackRemote::new();
    let mirrored = replica(1_000);
    remote.create_table(mirrored.table_schema("tasks").unwrap());
    mirrored
        .mirror(remote.channel("bench"), &["tasks"])
        .unwrap();
    let mut flip = 0i64;
    group.bench_function("mirrored", |b| b.iter(|| toggle(&mirrored, &mut flip)));

    group.finish();
}

criterion_group!(benches, bench_mutate);
criterion_main!(benches);
