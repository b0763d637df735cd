//! notifyq - a shared asynchronous publish/subscribe notification queue.
//!
//! This crate implements the core coordination protocol behind a
//! transactional LISTEN/NOTIFY style subsystem: a bounded, wrap-around
//! page-structured log in shared storage, written by committing
//! publishers, read concurrently by listening workers at their own pace,
//! truncated lazily from the slowest reader's position, and woken via
//! asynchronous signals.
//!
//! SQL parsing, the transaction manager, the paged-file substrate, the
//! signal primitive, the frontend wire protocol, and two-phase-commit
//! storage are all external collaborators; this crate defines traits for
//! each ([`oracle::TransactionOracle`], [`store::PagedStore`],
//! [`signal::SignalSender`], [`frontend::FrontendSink`],
//! [`twophase::TwoPhaseStore`], [`signal::Interruptible`]) and a host
//! implements them.
//!
//! # Example
//!
//! ```
//! use notifyq::{Config, SharedControlBlock, Worker};
//! use notifyq::store::MemoryPagedStore;
//! use notifyq::oracle::TestOracle;
//! use notifyq::frontend::RecordingSink;
//! use notifyq::twophase::MemoryTwoPhaseStore;
//! use notifyq::signal::NeverInterrupted;
//! use std::sync::Arc;
//!
//! struct NoopSignals;
//! impl notifyq::signal::SignalSender for NoopSignals {
//!     fn send_signal(&self, _pid: i32) {}
//! }
//!
//! let cfg = Config::default();
//! let store = Arc::new(MemoryPagedStore::new(cfg));
//! let control = notifyq::init_shared(&cfg, store.as_ref()).unwrap();
//! let signals = Arc::new(NoopSignals);
//! let twophase = Arc::new(MemoryTwoPhaseStore::new());
//!
//! let mut worker = Worker::new(cfg, control, store, signals, twophase, 100, 0);
//! let oracle = TestOracle::new(notifyq::oracle::TransactionLog::new(), 100, 0, 1, 1);
//! let interrupt = NeverInterrupted;
//!
//! worker.subscribe("weather").unwrap();
//! worker.publish("weather", "sunny").unwrap();
//! worker.at_precommit(&oracle, &interrupt).unwrap();
//! ```

pub mod config;
pub mod consume;
pub mod control;
pub mod entry;
pub mod error;
pub mod frontend;
pub mod oracle;
pub mod position;
pub mod publish;
pub mod signal;
pub mod store;
pub mod subscription;
pub mod twophase;
pub mod txn;
pub mod worker;

pub use config::Config;
pub use control::SharedControlBlock;
pub use entry::{Notification, QueueEntry};
pub use error::{NotifyError, Result};
pub use position::QueuePosition;
pub use worker::Worker;

use std::sync::Arc;

/// `init_shared()` (spec §4.9 Init, §6 "Exposed"): once-per-server setup run
/// before any worker attaches. Allocates the shared control block, zeroes
/// and writes page 0, and runs the paged store's startup directory scan
/// (`PagedStore::scan_and_cleanup`) to remove segments stale from a
/// previous run — the `[SUPPLEMENT]` this port carries over from
/// `AsyncShmemInit`/`SlruScanDirectory` in the original.
pub fn init_shared(cfg: &Config, store: &dyn store::PagedStore) -> Result<Arc<SharedControlBlock>> {
    let control = SharedControlBlock::new(cfg);
    let page = store.zero_new_page(0).map_err(|e| NotifyError::Store(Box::new(e)))?;
    store.write_page(0, &page).map_err(|e| NotifyError::Store(Box::new(e)))?;
    store
        .scan_and_cleanup(control.tail().page)
        .map_err(|e| NotifyError::Store(Box::new(e)))?;
    Ok(Arc::new(control))
}
