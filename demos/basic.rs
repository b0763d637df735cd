use notifyq::frontend::RecordingSink;
use notifyq::oracle::{TestOracle, TransactionLog};
use notifyq::signal::{NeverInterrupted, SignalSender};
use notifyq::store::MemoryPagedStore;
use notifyq::twophase::MemoryTwoPhaseStore;
use notifyq::{Config, SharedControlBlock, Worker};
use std::sync::Arc;

struct NoopSignals;

impl SignalSender for NoopSignals {
    fn send_signal(&self, pid: i32) {
        println!("  (would signal pid {pid})");
    }
}

fn main() {
    println!("notifyq basic example");
    println!("======================\n");

    let cfg = Config::default();
    let control = Arc::new(SharedControlBlock::new(&cfg));
    let store = Arc::new(MemoryPagedStore::new(cfg));
    let signals = Arc::new(NoopSignals);
    let twophase = Arc::new(MemoryTwoPhaseStore::new());
    let interrupt = NeverInterrupted;

    let mut publisher = Worker::new(
        cfg,
        Arc::clone(&control),
        Arc::clone(&store) as Arc<dyn notifyq::store::PagedStore>,
        Arc::clone(&signals) as Arc<dyn SignalSender>,
        Arc::clone(&twophase),
        1001,
        0,
    );
    let mut listener = Worker::new(
        cfg,
        Arc::clone(&control),
        Arc::clone(&store) as Arc<dyn notifyq::store::PagedStore>,
        Arc::clone(&signals) as Arc<dyn SignalSender>,
        Arc::clone(&twophase),
        1002,
        1,
    );

    let log = TransactionLog::new();
    let publisher_oracle = TestOracle::new(log.clone(), 1001, 0, 7, 1);
    let listener_oracle = TestOracle::new(log, 1002, 1, 7, 2);

    listener.subscribe("weather").unwrap();
    listener.at_precommit(&listener_oracle, &interrupt).unwrap();
    println!("listener subscribed to \"weather\"");

    publisher.publish("weather", "sunny, 24C").unwrap();
    publisher.publish("traffic", "clear").unwrap(); // listener won't see this
    publisher.at_precommit(&publisher_oracle, &interrupt).unwrap();
    publisher.at_postcommit_signal(true);
    println!("publisher committed 2 notifications on 2 channels");

    publisher_oracle.mark_committed();
    let sink = RecordingSink::new(3);
    listener.process_incoming_notify(&listener_oracle, &sink, &interrupt);

    for n in sink.take_delivered() {
        println!("listener received on \"{}\": {}", n.channel, n.payload);
    }
}
