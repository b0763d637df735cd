//! `TransactionOracle`: the external transaction-manager collaborator this
//! crate consumes (spec §6). A real host implements this against its own
//! transaction manager; a `TestOracle` double backs the integration tests.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a `Worker` needs to know about the transaction it is
/// currently running inside, supplied by the host's transaction manager.
pub trait TransactionOracle: Send + Sync {
    /// Did transaction `xid` commit? Entries read off the queue were
    /// written by whichever transaction held the queue lock at append
    /// time, not necessarily this worker's own current one, so every
    /// caller asks about a specific `xid` rather than "the" transaction.
    fn did_commit(&self, xid: u64) -> bool;

    /// Did transaction `xid` abort?
    fn did_abort(&self, xid: u64) -> bool;

    /// The currently executing transaction's id.
    fn current_xid(&self) -> u64;

    /// Current subtransaction nesting depth (`1` at top level).
    fn nest_level(&self) -> usize;

    /// The database this worker's session is connected to.
    fn current_db(&self) -> u32;

    /// This worker's OS-level process id (or analogous identifier).
    fn self_pid(&self) -> i32;

    /// This worker's backend slot index into the shared control block.
    fn self_slot(&self) -> usize;
}

/// Shared commit/abort record a [`TestOracle`] consults for `did_commit`/
/// `did_abort`. A real transaction manager is one shared authority every
/// backend asks about every xid; cloning this (cheap — an `Arc` around a
/// `Mutex<HashMap>`) across several `TestOracle`s models exactly that,
/// instead of giving each worker its own isolated, unreachable notion of
/// "committed".
#[derive(Clone, Default)]
pub struct TransactionLog {
    outcomes: Arc<Mutex<HashMap<u64, bool>>>,
}

impl TransactionLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `xid` as committed.
    pub fn mark_committed(&self, xid: u64) {
        self.outcomes.lock().insert(xid, true);
    }

    /// Record `xid` as aborted.
    pub fn mark_aborted(&self, xid: u64) {
        self.outcomes.lock().insert(xid, false);
    }

    #[must_use]
    pub fn did_commit(&self, xid: u64) -> bool {
        matches!(self.outcomes.lock().get(&xid), Some(true))
    }

    #[must_use]
    pub fn did_abort(&self, xid: u64) -> bool {
        matches!(self.outcomes.lock().get(&xid), Some(false))
    }
}

/// An in-process test double. `log` is a [`TransactionLog`] shared by every
/// `TestOracle` standing in for a different worker attached to the same
/// (fake) transaction manager; `xid`/`nest_level`/`db`/`pid`/`slot` are this
/// particular worker's own identity and are not shared.
#[derive(Debug, Clone)]
pub struct TestOracle {
    pub log: TransactionLog,
    pub xid: u64,
    pub nest_level: usize,
    pub db: u32,
    pub pid: i32,
    pub slot: usize,
}

impl std::fmt::Debug for TransactionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLog").finish_non_exhaustive()
    }
}

impl TestOracle {
    /// `log` is the shared transaction table; pass the same [`TransactionLog`]
    /// to every `TestOracle` that should be able to observe each other's
    /// commit/abort outcomes (i.e. every worker in one test scenario).
    #[must_use]
    pub fn new(log: TransactionLog, pid: i32, slot: usize, db: u32, xid: u64) -> Self {
        Self {
            log,
            xid,
            nest_level: 1,
            db,
            pid,
            slot,
        }
    }

    /// Record this oracle's own current transaction (`self.xid`) as
    /// committed in the shared log.
    pub fn mark_committed(&self) {
        self.log.mark_committed(self.xid);
    }

    /// Record this oracle's own current transaction (`self.xid`) as
    /// aborted in the shared log.
    pub fn mark_aborted(&self) {
        self.log.mark_aborted(self.xid);
    }
}

impl TransactionOracle for TestOracle {
    fn did_commit(&self, xid: u64) -> bool {
        self.log.did_commit(xid)
    }

    fn did_abort(&self, xid: u64) -> bool {
        self.log.did_abort(xid)
    }

    fn current_xid(&self) -> u64 {
        self.xid
    }

    fn nest_level(&self) -> usize {
        self.nest_level
    }

    fn current_db(&self) -> u32 {
        self.db
    }

    fn self_pid(&self) -> i32 {
        self.pid
    }

    fn self_slot(&self) -> usize {
        self.slot
    }
}
