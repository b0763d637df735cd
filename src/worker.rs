//! `Worker`: one client session's view of the notification subsystem (spec
//! §2-§4, "per-worker"/"per-transaction" state tied together). Each OS
//! process in the original maps to one `Worker` holding an `Arc` to the
//! `SharedControlBlock` and paged store shared with every other worker.

use crate::config::Config;
use crate::consume::{self, ConsumeMode, UncommittedBuffer};
use crate::control::SharedControlBlock;
use crate::error::{NotifyError, Result};
use crate::frontend::FrontendSink;
use crate::oracle::TransactionOracle;
use crate::publish;
use crate::signal::{InterruptFlags, Interruptible, SignalSender};
use crate::store::PagedStore;
use crate::subscription::SubscriptionSet;
use crate::twophase::TwoPhaseStore;
use crate::txn::TxnState;
use log::{trace, warn};
use std::sync::Arc;
use std::thread;

/// One worker's complete local state plus the shared collaborators it
/// talks to. Construct one per client session; `self_pid`/`self_slot` are
/// fixed for the worker's lifetime.
pub struct Worker {
    cfg: Config,
    control: Arc<SharedControlBlock>,
    store: Arc<dyn PagedStore>,
    signal_sender: Arc<dyn SignalSender>,
    twophase: Arc<dyn TwoPhaseStore>,
    self_pid: i32,
    self_slot: usize,
    subs: SubscriptionSet,
    txn: TxnState,
    uncommitted: UncommittedBuffer,
    interrupt: InterruptFlags,
}

impl Worker {
    #[must_use]
    pub fn new(
        cfg: Config,
        control: Arc<SharedControlBlock>,
        store: Arc<dyn PagedStore>,
        signal_sender: Arc<dyn SignalSender>,
        twophase: Arc<dyn TwoPhaseStore>,
        self_pid: i32,
        self_slot: usize,
    ) -> Self {
        Self {
            cfg,
            control,
            store,
            signal_sender,
            twophase,
            self_pid,
            self_slot,
            subs: SubscriptionSet::new(),
            txn: TxnState::new(),
            uncommitted: UncommittedBuffer::new(),
            interrupt: InterruptFlags::new(),
        }
    }

    // ---- Public API: exposed operations (spec §6 "Exposed") ----

    /// `LISTEN channel` — buffered until pre-commit (spec §4.3).
    pub fn subscribe(&mut self, channel: &str) -> Result<()> {
        self.txn.stage_subscribe(channel, &self.cfg)
    }

    /// `UNLISTEN channel` — buffered until pre-commit (spec §4.3).
    pub fn unsubscribe(&mut self, channel: &str) -> Result<()> {
        self.txn
            .stage_unsubscribe(channel, self.subs.exit_hook_registered(), &self.cfg)
    }

    /// `UNLISTEN *` — buffered until pre-commit (spec §4.3).
    pub fn unsubscribe_all(&mut self) {
        self.txn.stage_unsubscribe_all(self.subs.exit_hook_registered());
    }

    /// `NOTIFY channel, payload` — buffered with duplicate collapsing until
    /// pre-commit (spec §4.4).
    pub fn publish(&mut self, channel: &str, payload: &str) -> Result<()> {
        self.txn.stage_publish(channel, payload, &self.cfg)
    }

    // ---- Subtransaction lifecycle (spec §4.8) ----

    pub fn at_sub_start(&mut self) {
        self.txn.sub_start();
    }

    pub fn at_sub_commit(&mut self) {
        self.txn.sub_commit();
    }

    pub fn at_sub_abort(&mut self) {
        self.txn.sub_abort();
    }

    /// Top-level abort: nothing has reached the queue, so this just
    /// discards every pending buffer (spec §4.8).
    pub fn at_abort(&mut self) {
        self.txn.abort();
    }

    /// Spec §4.3/§4.4 pre-commit: apply subscription actions in order,
    /// then append any pending notifications to the queue, retrying
    /// through the overflow protocol until the queue accepts all of them.
    /// Must run before the caller's transaction manager durably records
    /// the commit, so a failure here still aborts cleanly.
    pub fn at_precommit(&mut self, oracle: &dyn TransactionOracle, interruptible: &dyn Interruptible) -> Result<()> {
        let (actions, notifications) = self.txn.take_for_commit();

        for action in actions {
            self.apply_action(action);
        }

        if notifications.is_empty() {
            return Ok(());
        }

        self.append_with_overflow_retry(oracle, notifications, interruptible)
    }

    /// Spec §4.8 `Prepare`: rejected outright if any subscription action is
    /// pending. Otherwise persists the staged notifications under the
    /// two-phase store and clears local pending state — nothing reaches
    /// the shared queue until `at_postcommit_prepared`.
    pub fn at_prepare(&mut self, gid: &str) -> Result<()> {
        if self.txn.has_pending_actions() {
            return Err(NotifyError::PrepareNotSupported);
        }
        let (_, notifications) = self.txn.take_for_commit();
        self.twophase.register_record(gid, &notifications);
        Ok(())
    }

    /// Spec §4.8: on commit of a previously prepared transaction, decode
    /// the persisted record and re-publish each notification inside the
    /// now-committing transaction.
    pub fn at_postcommit_prepared(
        &mut self,
        gid: &str,
        oracle: &dyn TransactionOracle,
        interruptible: &dyn Interruptible,
    ) -> Result<()> {
        let Some(notifications) = self.twophase.take_record(gid) else {
            return Ok(());
        };
        if notifications.is_empty() {
            return Ok(());
        }
        self.append_with_overflow_retry(oracle, notifications, interruptible)
    }

    /// Discards a prepared transaction's record without delivering it
    /// (`ROLLBACK PREPARED`).
    pub fn at_rollback_prepared(&mut self, gid: &str) {
        self.twophase.discard_record(gid);
    }

    /// Spec §4.7: send wakeups to other listeners once the transaction
    /// manager has durably recorded the commit. `slow_only` skips
    /// listeners already caught up to `head`.
    pub fn at_postcommit_signal(&mut self, slow_only: bool) {
        let targets = {
            let guard = self.control.lock_exclusive();
            let head = guard.head();
            let mut targets = Vec::new();
            for i in 0..guard.max_workers() {
                if i == self.self_slot {
                    continue;
                }
                let slot = guard.backend(i);
                if !slot.is_active() {
                    continue;
                }
                if slow_only && slot.position() == head {
                    continue;
                }
                targets.push(slot.pid());
            }
            targets
        };
        for pid in targets {
            self.signal_sender.send_signal(pid);
        }
    }

    // ---- Wakeup / interrupt protocol (spec §4.7) ----

    /// Called when the worker returns to idle (outside a transaction
    /// block). Performs the enable handshake and, if a notification was
    /// already pending, processes it immediately so no wakeup is lost.
    pub fn enable_interrupt(
        &mut self,
        oracle: &dyn TransactionOracle,
        subs_sink: &dyn FrontendSink,
        catchup_interrupt: &dyn Interruptible,
    ) {
        if self.interrupt.enable() {
            self.process_incoming_notify(oracle, subs_sink, catchup_interrupt);
        }
    }

    /// Called on entering command handling; returns the prior enabled
    /// state for the caller to restore later via [`Worker::restore_interrupt`].
    pub fn disable_interrupt(&mut self) -> bool {
        let was_enabled = self.interrupt.is_enabled();
        self.interrupt.disable();
        was_enabled
    }

    pub fn restore_interrupt(&mut self, was_enabled: bool) {
        if was_enabled {
            self.interrupt.enable();
        } else {
            self.interrupt.disable();
        }
    }

    /// The (conceptual) signal handler's effect: record that a
    /// notification arrived. Async-signal-safe — only flips an atomic.
    ///
    /// The original's `HandleNotifyInterrupt` also calls
    /// `ProcessIncomingNotify()` directly from the handler when interrupts
    /// are already enabled, so a signal arriving while idle is acted on
    /// immediately rather than at the next `enable_interrupt` call. This
    /// crate does not: `process_incoming_notify` takes `&mut self` plus
    /// live `oracle`/`sink`/`Interruptible` arguments that a real
    /// async-signal context cannot safely obtain or call through (it would
    /// mean taking locks and doing I/O from signal-handler context, which
    /// is exactly what the two-flag handshake in `signal.rs` exists to
    /// avoid). So a signal that arrives while already enabled and idle sits
    /// latched in `occurred` until the next `enable_interrupt` call picks
    /// it up, rather than being processed immediately — see
    /// `DESIGN.md`'s Open Question decisions for why this is an accepted
    /// trade-off rather than an oversight.
    pub fn raise_interrupt(&self) {
        self.interrupt.raise();
    }

    /// `ProcessIncomingNotify` (spec §4.7): drains the uncommitted buffer,
    /// then runs a `read_only_committed` consume pass, flushing frontend
    /// output once at the end — never per-entry.
    ///
    /// # Panics
    /// In debug builds, panics if called while a transaction is open
    /// (spec §4.7 "asserts no active xid") — this must only run at an
    /// idle point.
    pub fn process_incoming_notify(
        &mut self,
        oracle: &dyn TransactionOracle,
        sink: &dyn FrontendSink,
        _catchup_interrupt: &dyn Interruptible,
    ) {
        debug_assert!(
            oracle.current_xid() == crate::config::INVALID_XID,
            "ProcessIncomingNotify must run outside any active transaction"
        );

        self.uncommitted.process(&self.subs, oracle, sink);

        if let Err(e) = consume::consume(
            &self.control,
            self.store.as_ref(),
            &self.cfg,
            self.self_slot,
            oracle.current_db(),
            ConsumeMode::ReadOnlyCommitted,
            &self.subs,
            oracle,
            sink,
            &mut self.uncommitted,
        ) {
            warn!("notifyq: consume pass failed: {e}");
        }

        // Spec §4.6: flush once at the end of ProcessIncomingNotify, never
        // per-entry or per-page.
        sink.flush_output();
    }

    /// Per-worker exit (spec §4.9): if this worker ever registered the
    /// exit hook, synchronously abort any open transaction and unsubscribe
    /// from everything so its slot is released and `tail` can advance.
    pub fn at_exit(&mut self) {
        if !self.subs.exit_hook_registered() {
            return;
        }
        self.at_abort();
        self.subs.clear();
        self.control.backend(self.self_slot).clear();
        if let Err(e) = publish::advance_tail(&self.control, self.store.as_ref(), &self.cfg) {
            warn!("notifyq: advance_tail at exit failed: {e}");
        }
    }

    // ---- internals ----

    fn apply_action(&mut self, action: crate::txn::ListenAction) {
        use crate::txn::ListenAction;
        match action {
            ListenAction::Subscribe(channel) => {
                let was_first = self.subs.insert(&channel);
                if was_first {
                    let head = {
                        let guard = self.control.lock_shared();
                        let slot = guard.backend(self.self_slot);
                        slot.set_position(guard.head());
                        slot.set_pid(self.self_pid);
                        guard.head()
                    };
                    trace!("notifyq: worker {} registered at head {head:?}", self.self_pid);
                    if let Err(e) = publish::advance_tail(&self.control, self.store.as_ref(), &self.cfg) {
                        warn!("notifyq: advance_tail after subscribe failed: {e}");
                    }
                    self.subs.mark_exit_hook_registered();
                }
            }
            ListenAction::Unsubscribe(channel) => {
                let now_empty = self.subs.remove(&channel);
                self.release_if_empty(now_empty);
            }
            ListenAction::UnsubscribeAll => {
                self.subs.clear();
                self.release_if_empty(true);
            }
        }
    }

    fn release_if_empty(&mut self, now_empty: bool) {
        if !now_empty {
            return;
        }
        let was_tail = {
            let guard = self.control.lock_shared();
            let slot = guard.backend(self.self_slot);
            let was_tail = slot.position() == guard.tail();
            slot.clear();
            was_tail
        };
        if was_tail {
            if let Err(e) = publish::advance_tail(&self.control, self.store.as_ref(), &self.cfg) {
                warn!("notifyq: advance_tail after unsubscribe failed: {e}");
            }
        }
    }

    /// Spec §4.4 overflow protocol, run until every pending notification
    /// has been appended to the queue.
    fn append_with_overflow_retry(
        &mut self,
        oracle: &dyn TransactionOracle,
        mut pending: Vec<crate::entry::Notification>,
        interruptible: &dyn Interruptible,
    ) -> Result<()> {
        loop {
            let outcome = publish::append_pending(
                &self.control,
                self.store.as_ref(),
                &self.cfg,
                oracle.current_db(),
                self.self_pid,
                oracle.current_xid(),
                pending,
            )?;

            if let Some(pid) = outcome.warn_pid {
                warn!("notifyq: notification queue is full; slowest listener is pid {pid}");
            }

            if outcome.remaining.is_empty() {
                if self.cfg.trace_notify {
                    trace!("notifyq: pid {} appended all pending notifications", self.self_pid);
                }
                return Ok(());
            }

            if interruptible.is_interrupted() {
                // Surface back to the caller's own cancellation handling;
                // the remaining notifications are simply lost from this
                // attempt, matching the original's "caller must retry the
                // whole statement" behavior under a cancelled wait.
                return Ok(());
            }

            self.at_postcommit_signal(true);

            // Drain our own cursor so our backend slot's position moves
            // forward, which is what actually frees queue space.
            let mut scratch = UncommittedBuffer::new();
            let _ = consume::consume(
                &self.control,
                self.store.as_ref(),
                &self.cfg,
                self.self_slot,
                oracle.current_db(),
                ConsumeMode::ReadAllToUncommitted,
                &self.subs,
                oracle,
                &crate::frontend::NullSink,
                &mut scratch,
            );
            // Whatever we drained into our own cursor becomes part of our
            // uncommitted buffer for the next idle processing pass.
            self.uncommitted.extend(scratch);

            publish::advance_tail(&self.control, self.store.as_ref(), &self.cfg)?;

            thread::sleep(self.cfg.overflow_retry_sleep);
            pending = outcome.remaining;
        }
    }
}
