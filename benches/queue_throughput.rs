use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use notifyq::frontend::RecordingSink;
use notifyq::oracle::{TestOracle, TransactionLog};
use notifyq::signal::NeverInterrupted;
use notifyq::store::MemoryPagedStore;
use notifyq::twophase::MemoryTwoPhaseStore;
use notifyq::{Config, SharedControlBlock, Worker};
use std::sync::Arc;

struct NoopSignals;
impl notifyq::signal::SignalSender for NoopSignals {
    fn send_signal(&self, _pid: i32) {}
}

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");
    const BATCH: usize = 1000;
    group.throughput(Throughput::Elements(BATCH as u64));

    group.bench_function("append_pending_no_overflow", |b| {
        b.iter(|| {
            let cfg = Config::default();
            let control = Arc::new(SharedControlBlock::new(&cfg));
            let store = Arc::new(MemoryPagedStore::new(cfg));
            let signals = Arc::new(NoopSignals);
            let twophase = Arc::new(MemoryTwoPhaseStore::new());
            let mut worker = Worker::new(
                cfg,
                Arc::clone(&control),
                Arc::clone(&store) as Arc<dyn notifyq::store::PagedStore>,
                signals as Arc<dyn notifyq::signal::SignalSender>,
                twophase,
                1,
                0,
            );
            let oracle = TestOracle::new(TransactionLog::new(), 1, 0, 1, 1);
            let interrupt = NeverInterrupted;

            for i in 0..BATCH {
                worker.publish("bench", &format!("payload-{i}")).unwrap();
            }
            worker.at_precommit(black_box(&oracle), &interrupt).unwrap();
        });
    });

    group.finish();
}

fn bench_consume(c: &mut Criterion) {
    let mut group = c.benchmark_group("consume");
    const BATCH: usize = 1000;
    group.throughput(Throughput::Elements(BATCH as u64));

    group.bench_function("read_only_committed", |b| {
        b.iter(|| {
            let cfg = Config::default();
            let control = Arc::new(SharedControlBlock::new(&cfg));
            let store = Arc::new(MemoryPagedStore::new(cfg));
            let signals = Arc::new(NoopSignals);
            let twophase = Arc::new(MemoryTwoPhaseStore::new());

            let mut publisher = Worker::new(
                cfg,
                Arc::clone(&control),
                Arc::clone(&store) as Arc<dyn notifyq::store::PagedStore>,
                Arc::clone(&signals) as Arc<dyn notifyq::signal::SignalSender>,
                Arc::clone(&twophase),
                1,
                0,
            );
            let mut listener = Worker::new(
                cfg,
                Arc::clone(&control),
                Arc::clone(&store) as Arc<dyn notifyq::store::PagedStore>,
                signals as Arc<dyn notifyq::signal::SignalSender>,
                twophase,
                2,
                1,
            );

            let log = TransactionLog::new();
            let publisher_oracle = TestOracle::new(log.clone(), 1, 0, 1, 1);
            let listener_oracle = TestOracle::new(log, 2, 1, 1, 2);
            let interrupt = NeverInterrupted;

            listener.subscribe("bench").unwrap();
            listener.at_precommit(&listener_oracle, &interrupt).unwrap();

            for i in 0..BATCH {
                publisher.publish("bench", &format!("payload-{i}")).unwrap();
            }
            publisher.at_precommit(&publisher_oracle, &interrupt).unwrap();
            publisher_oracle.mark_committed();

            let sink = RecordingSink::new(3);
            listener.process_incoming_notify(black_box(&listener_oracle), &sink, &interrupt);
            black_box(sink.take_delivered());
        });
    });

    group.finish();
}

fn bench_mixed_listeners(c: &mut Criterion) {
    let mut group = c.benchmark_group("wakeup_fanout");

    for num_listeners in [1, 4, 16].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(num_listeners), num_listeners, |b, &n| {
            b.iter(|| {
                let cfg = Config {
                    max_workers: n + 1,
                    ..Config::default()
                };
                let control = Arc::new(SharedControlBlock::new(&cfg));
                let store = Arc::new(MemoryPagedStore::new(cfg));
                let signals = Arc::new(NoopSignals);
                let twophase = Arc::new(MemoryTwoPhaseStore::new());

                let mut publisher = Worker::new(
                    cfg,
                    Arc::clone(&control),
                    Arc::clone(&store) as Arc<dyn notifyq::store::PagedStore>,
                    Arc::clone(&signals) as Arc<dyn notifyq::signal::SignalSender>,
                    Arc::clone(&twophase),
                    1,
                    0,
                );
                let log = TransactionLog::new();
                let publisher_oracle = TestOracle::new(log.clone(), 1, 0, 1, 1);
                let interrupt = NeverInterrupted;

                for slot in 1..=n {
                    let mut listener = Worker::new(
                        cfg,
                        Arc::clone(&control),
                        Arc::clone(&store) as Arc<dyn notifyq::store::PagedStore>,
                        Arc::clone(&signals) as Arc<dyn notifyq::signal::SignalSender>,
                        Arc::clone(&twophase),
                        100 + slot as i32,
                        slot,
                    );
                    let listener_oracle = TestOracle::new(log.clone(), 100 + slot as i32, slot, 1, 1 + slot as u64);
                    listener.subscribe("bench").unwrap();
                    listener.at_precommit(&listener_oracle, &interrupt).unwrap();
                }

                publisher.publish("bench", "x").unwrap();
                publisher.at_precommit(&publisher_oracle, &interrupt).unwrap();
                publisher.at_postcommit_signal(black_box(true));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_publish, bench_consume, bench_mixed_listeners);
criterion_main!(benches);
