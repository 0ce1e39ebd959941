use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::runtime::Runtime;

use chronicle_core::{ExpectedVersion, StreamId};
use chronicle_events::{AggregateRoot, AggregateState, NewEvent};
use chronicle_store::{
    EventStore, InMemoryEventStore, InMemorySnapshotStore, Repository, SnapshotPolicy,
};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Counter {
    total: i64,
}

impl AggregateState for Counter {
    fn aggregate_type() -> &'static str {
        "bench.counter"
    }

    fn apply_event(&mut self, event_type: &str, data: &serde_json::Value) {
        if event_type == "counter.incremented" {
            self.total += data.get("delta").and_then(|v| v.as_i64()).unwrap_or(0);
        }
    }
}

fn increment(delta: i64) -> NewEvent {
    NewEvent::new("counter.incremented", json!({ "delta": delta }))
}

fn bench_append_throughput(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("append_throughput");

    for batch_size in [1usize, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("batch_append", batch_size),
            batch_size,
            |b, &size| {
                let store = InMemoryEventStore::new();
                let stream_id = StreamId::new();

                b.iter(|| {
                    let events: Vec<NewEvent> =
                        (0..size).map(|i| increment(i as i64)).collect();
                    let result = rt
                        .block_on(store.append(stream_id, events, ExpectedVersion::Any))
                        .unwrap();
                    black_box(result.stream_version);
                });
            },
        );
    }

    group.finish();
}

fn bench_stream_replay(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("stream_replay");

    for event_count in [10usize, 100, 1000, 10000].iter() {
        group.bench_with_input(
            BenchmarkId::new("load_without_snapshot", event_count),
            event_count,
            |b, &count| {
                let store = InMemoryEventStore::new();
                let stream_id = StreamId::new();
                rt.block_on(async {
                    let events: Vec<NewEvent> =
                        (0..count).map(|i| increment(i as i64)).collect();
                    store
                        .append(stream_id, events, ExpectedVersion::Any)
                        .await
                        .unwrap();
                });

                let repo: Repository<InMemoryEventStore, InMemorySnapshotStore> =
                    Repository::with_policy(
                        store,
                        InMemorySnapshotStore::new(),
                        SnapshotPolicy::disabled(),
                    );

                b.iter(|| {
                    let root: AggregateRoot<Counter> =
                        rt.block_on(repo.load(stream_id)).unwrap();
                    black_box(root.state().total);
                });
            },
        );
    }

    group.finish();
}

fn bench_snapshot_vs_full_replay(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("snapshot_vs_full_replay");

    let event_count = 5000usize;

    let make_repo = |policy: SnapshotPolicy| {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::new();
        rt.block_on(async {
            let events: Vec<NewEvent> = (0..event_count).map(|i| increment(i as i64)).collect();
            store
                .append(stream_id, events, ExpectedVersion::Any)
                .await
                .unwrap();
        });
        let repo = Repository::with_policy(store, InMemorySnapshotStore::new(), policy);
        (repo, stream_id)
    };

    group.bench_function("full_replay", |b| {
        let (repo, stream_id) = make_repo(SnapshotPolicy::disabled());
        b.iter(|| {
            let root: AggregateRoot<Counter> = rt.block_on(repo.load(stream_id)).unwrap();
            black_box(root.version());
        });
    });

    group.bench_function("snapshot_then_load", |b| {
        let (repo, stream_id) = make_repo(SnapshotPolicy::every(100));
        // First load writes the snapshot; subsequent loads start from it.
        rt.block_on(async {
            let _: AggregateRoot<Counter> = repo.load(stream_id).await.unwrap();
        });
        b.iter(|| {
            let root: AggregateRoot<Counter> = rt.block_on(repo.load(stream_id)).unwrap();
            black_box(root.version());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_append_throughput,
    bench_stream_replay,
    bench_snapshot_vs_full_replay
);
criterion_main!(benches);
