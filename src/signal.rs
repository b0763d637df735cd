//! Inbound notification delivery and the signal-safe interrupt handshake
//! (spec §4.6, §5 "Signal safety"). A real backend wakes a sleeping worker
//! with a signal; the worker's handler must not do unbounded work, so it
//! only ever flips a flag, deferring the actual queue scan to the next safe
//! point (`process_incoming` below).
//!
//! `SignalSender` is the external collaborator (spec §6) this crate uses to
//! wake *other* workers after publishing; `Interruptible` is the external
//! collaborator the overflow-protocol retry loop polls to notice
//! cancellation (spec §5). Both are named `[AMBIENT]`/`[SUPPLEMENT]`
//! additions in SPEC_FULL.md §5-6.

use std::sync::atomic::{AtomicBool, Ordering};

/// Wakes another worker so it re-checks the shared queue. Implemented by
/// the host over whatever IPC primitive its workers use (`kill(2)`,
/// an eventfd, a condvar — this crate is agnostic).
pub trait SignalSender: Send + Sync {
    /// Ask the worker identified by `pid` to re-check the queue soon.
    fn send_signal(&self, pid: i32);
}

/// Polled by the overflow-protocol retry loop (spec §4.4 "Overflow
/// protocol") to notice an external request to abandon the wait.
pub trait Interruptible: Send + Sync {
    /// `true` once the current operation should give up and return control
    /// to its caller (e.g. a query-cancel request arrived).
    fn is_interrupted(&self) -> bool;
}

/// A `Interruptible` that never reports an interrupt, for tests and demos
/// that do not exercise cancellation.
#[derive(Default)]
pub struct NeverInterrupted;

impl Interruptible for NeverInterrupted {
    fn is_interrupted(&self) -> bool {
        false
    }
}

/// The two-flag signal-handler handshake (spec §5 "Signal safety"):
/// `enabled` records whether the worker is in a state where it is safe to
/// act on an incoming notification immediately; `occurred` is set by the
/// (conceptual) signal handler and is the only thing that handler touches.
/// A normal control-flow point later checks `occurred` and, if `enabled`,
/// processes it inline; otherwise processing is deferred until `enabled`
/// becomes true again.
///
/// Both flags are plain `AtomicBool`s so the handler side never blocks,
/// allocates, or takes a lock — the async-signal-safety constraint named
/// in spec §5.
pub struct InterruptFlags {
    enabled: AtomicBool,
    occurred: std::sync::Arc<AtomicBool>,
}

impl Default for InterruptFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptFlags {
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            occurred: std::sync::Arc::new(AtomicBool::new(false)),
        }
    }

    /// The underlying flag a `signal_hook::flag::register` call can target
    /// directly, so the real handler sets exactly this crate's flag with no
    /// bridging step (see `unix::register_wakeup_signal`).
    #[must_use]
    pub fn occurred_handle(&self) -> std::sync::Arc<AtomicBool> {
        std::sync::Arc::clone(&self.occurred)
    }

    /// Called from the (conceptual) signal handler: record that a
    /// notification arrived. Never blocks.
    pub fn raise(&self) {
        self.occurred.store(true, Ordering::SeqCst);
    }

    /// Enable immediate processing and report whether a notification is
    /// already pending — mirrors `ProcessIncomingNotify`'s "if an interrupt
    /// was already pending, deal with it now" behavior, so no wakeup is
    /// lost between `disable_interrupt` and `enable_interrupt`.
    #[must_use]
    pub fn enable(&self) -> bool {
        self.enabled.store(true, Ordering::SeqCst);
        self.occurred.load(Ordering::SeqCst)
    }

    /// Disable immediate processing (entering a region where queue state
    /// must not change under us, e.g. mid-consume).
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// Take and clear the pending flag, regardless of `enabled`. Used by
    /// the explicit "process incoming notifications" call after a consume
    /// pass, so a notification that arrived mid-pass isn't lost.
    pub fn take_occurred(&self) -> bool {
        self.occurred.swap(false, Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

#[cfg(feature = "unix-signals")]
pub mod unix {
    //! Real OS signal integration, grounded on `signal-hook` (grounded:
    //! `william-lbn-neon` in the retrieval pack uses `signal-hook` for
    //! exactly this style of "flip an atomic from the handler" pattern).
    //! Feature-gated because the rest of this crate has no OS dependency.

    use super::InterruptFlags;
    use signal_hook::consts::SIGUSR1;
    use signal_hook::flag;
    use std::io;

    /// Registers `SIGUSR1` (the conventional "you have mail" signal this
    /// subsystem's host processes use to wake a sleeping listener) to set
    /// `flags`'s `occurred` flag directly via `signal_hook::flag::register`,
    /// which is itself async-signal-safe — no handler code of our own runs.
    pub fn register_wakeup_signal(flags: &InterruptFlags) -> io::Result<()> {
        flag::register(SIGUSR1, flags.occurred_handle())?;
        Ok(())
    }
}
