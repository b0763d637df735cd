//! The consume path (spec §4.6): walks committed (or all, for the
//! overflow-draining publisher) entries from a worker's own cursor up to
//! the shared head, delivering subscribed channels to the frontend and
//! buffering still-in-flight transactions' notifications for a later pass.

use crate::config::Config;
use crate::control::SharedControlBlock;
use crate::entry::{Notification, QueueEntry};
use crate::error::Result;
use crate::frontend::FrontendSink;
use crate::oracle::TransactionOracle;
use crate::position;
use crate::store::{PageAccess, PagedStore};
use crate::subscription::SubscriptionSet;
use log::warn;

/// Which entries a consume pass should pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeMode {
    /// Deliver committed entries; stop at the first still-in-progress
    /// transaction (normal idle-wakeup processing).
    ReadOnlyCommitted,
    /// Copy every same-database entry, committed or not, into the
    /// uncommitted buffer — used by a blocked publisher to drain its own
    /// cursor and free queue space (spec §4.4 overflow protocol).
    ReadAllToUncommitted,
}

/// Per-worker buffer of notifications whose source transaction had not yet
/// committed when they were read. Preserves arrival order; a single
/// transaction's notifications always stay contiguous (spec §4.6).
#[derive(Default)]
pub struct UncommittedBuffer {
    entries: std::collections::VecDeque<(u64, Notification)>,
}

impl UncommittedBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, xid: u64, n: Notification) {
        self.entries.push_back((xid, n));
    }

    /// Append another buffer's entries after ours, preserving order.
    pub fn extend(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }

    /// Drain from the front while the head entry's transaction has
    /// resolved: deliver commits (if still subscribed), drop aborts. Stops
    /// at the first still-running xid, leaving the rest for a later round.
    ///
    /// Does not flush the sink — spec §4.6 reserves that for a single call
    /// at the very end of `ProcessIncomingNotify`, after this and the
    /// subsequent queue consume pass have both run (see `Worker::process_incoming_notify`).
    pub fn process(&mut self, subs: &SubscriptionSet, oracle: &dyn TransactionOracle, sink: &dyn FrontendSink) {
        while let Some((xid, _)) = self.entries.front() {
            let xid = *xid;
            if oracle.did_commit(xid) {
                let (_, n) = self.entries.pop_front().unwrap();
                if subs.is_subscribed(&n.channel) {
                    sink.send_notify(&n);
                }
            } else if oracle.did_abort(xid) {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Outcome of a single [`consume`] call.
#[derive(Default)]
pub struct ConsumeOutcome {
    /// Notifications delivered directly during this pass (committed mode).
    pub delivered: usize,
}

/// Spec §4.6 procedure. Walks from this worker's current position up to a
/// snapshot of `head`, consulting the transaction oracle for each entry's
/// commit status, delivering or buffering as dictated by `mode`. Advances
/// `backend[self].position` and schedules `advance_tail` if this worker's
/// old position was the bottleneck.
///
/// Does not flush the sink itself, even in `ReadOnlyCommitted` mode — see
/// [`UncommittedBuffer::process`] for why flushing is the caller's job.
pub fn consume(
    control: &SharedControlBlock,
    store: &dyn PagedStore,
    cfg: &Config,
    slot: usize,
    database_id: u32,
    mode: ConsumeMode,
    subs: &SubscriptionSet,
    oracle: &dyn TransactionOracle,
    sink: &dyn FrontendSink,
    uncommitted: &mut UncommittedBuffer,
) -> Result<ConsumeOutcome> {
    let (mut pos, head_snapshot, old_pos) = {
        let guard = control.lock_shared();
        let pos = guard.backend(slot).position();
        (pos, guard.head(), pos)
    };

    let mut outcome = ConsumeOutcome::default();
    if pos == head_snapshot {
        return Ok(outcome);
    }

    while pos != head_snapshot {
        let page = match store.read_page(pos.page, PageAccess::ReadOnly) {
            Ok(p) => p,
            Err(e) => {
                // Log-and-skip policy (§9 Open Question): a damaged page
                // must not take the worker down.
                warn!("notifyq: failed to read page {}: {e}; skipping", pos.page);
                let (next, _) = position::advance(pos, cfg.min_entry_size() as u32, cfg);
                pos = next;
                continue;
            }
        };

        let mut batch: Vec<Notification> = Vec::new();
        let mut stopped_early = false;

        loop {
            let remaining = cfg.page_size as usize - pos.offset as usize;
            if remaining < cfg.min_entry_size() {
                break;
            }
            let entry = QueueEntry::read_from(&page[pos.offset as usize..], cfg);
            if entry.is_filler() {
                let (next, jumped) = position::advance(pos, entry.length, cfg);
                pos = next;
                if jumped {
                    break;
                }
                continue;
            }
            if entry.database_id != database_id {
                let (next, jumped) = position::advance(pos, entry.length, cfg);
                pos = next;
                if jumped {
                    break;
                }
                continue;
            }

            let n = Notification {
                channel: entry.channel.clone(),
                payload: entry.payload.clone(),
                xid: entry.xid,
                peer_pid: entry.source_pid,
            };

            match mode {
                ConsumeMode::ReadOnlyCommitted => {
                    if oracle.did_commit(entry.xid) {
                        if subs.is_subscribed(&n.channel) {
                            batch.push(n);
                        }
                    } else if oracle.did_abort(entry.xid) {
                        // skip
                    } else {
                        stopped_early = true;
                        break;
                    }
                }
                ConsumeMode::ReadAllToUncommitted => {
                    uncommitted.push(entry.xid, n);
                }
            }

            let (next, jumped) = position::advance(pos, entry.length, cfg);
            pos = next;
            if jumped {
                break;
            }
        }

        for n in &batch {
            sink.send_notify(n);
            outcome.delivered += 1;
        }

        if stopped_early {
            break;
        }
    }

    {
        let guard = control.lock_shared();
        guard.backend(slot).set_position(pos);
    }

    if old_pos == control.tail() {
        crate::publish::advance_tail(control, store, cfg)?;
    }

    Ok(outcome)
}
