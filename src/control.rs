//! The shared control block: head/tail positions and per-worker backend
//! slots, guarded by `QueueLock`. See spec §3 "Shared control block" and
//! §5 "Locks".
//!
//! `QueueLock` is a [`parking_lot::RwLock`] (grounded:
//! `harborgrid-justin-rusty-db`, `Dicklesworthstone-frankensqlite` — see
//! SPEC_FULL.md). Shared mode lets a worker read `head`/`tail` and update
//! only its own backend slot; exclusive mode is required to mutate
//! `head`/`tail` or inspect/mutate another worker's slot. The locking
//! *discipline* spec §5 describes is encoded here as two guard types,
//! [`SharedGuard`] and [`ExclusiveGuard`], rather than left as a comment —
//! callers can only reach `set_head`/`set_tail`/`is_full` through an
//! `ExclusiveGuard`.
//!
//! Per-slot fields are plain atomics so a worker can publish its own
//! position/pid while holding only a *shared* `QueueLock` guard — the same
//! "single writer, lock-free update" trick the teacher crate uses for
//! `Ring<T>`'s `head`/`tail` sequence counters in `ring.rs`.

use crate::config::{Config, INVALID_PID};
use crate::position::{self, QueuePosition};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::time::Instant;

/// One `backend[]` entry: `(pid, position)`. `pid == INVALID_PID` means the
/// slot is unused (spec §3).
pub struct BackendSlot {
    pid: AtomicI32,
    page: AtomicU32,
    offset: AtomicU32,
}

impl BackendSlot {
    fn new() -> Self {
        Self {
            pid: AtomicI32::new(INVALID_PID),
            page: AtomicU32::new(0),
            offset: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn pid(&self) -> i32 {
        self.pid.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.pid() != INVALID_PID
    }

    #[must_use]
    pub fn position(&self) -> QueuePosition {
        QueuePosition::new(self.page.load(Ordering::Acquire), self.offset.load(Ordering::Acquire))
    }

    /// Set this slot's position. Does not touch `pid` — used both at
    /// subscribe time (alongside `set_pid`) and whenever a worker advances
    /// its own cursor after a consume pass.
    pub fn set_position(&self, pos: QueuePosition) {
        self.page.store(pos.page, Ordering::Release);
        self.offset.store(pos.offset, Ordering::Release);
    }

    pub fn set_pid(&self, pid: i32) {
        self.pid.store(pid, Ordering::Release);
    }

    /// Release the slot (§4.3 `Unsubscribe`/`UnsubscribeAll` when the
    /// local channel set becomes empty).
    pub fn clear(&self) {
        self.pid.store(INVALID_PID, Ordering::Release);
    }
}

struct HeadTail {
    head: QueuePosition,
    tail: QueuePosition,
    last_full_warn: Option<Instant>,
}

/// The shared control block. One instance per server; workers hold a
/// cloned `Arc<SharedControlBlock>` (see SPEC_FULL.md's "crate framing").
pub struct SharedControlBlock {
    backend: Vec<BackendSlot>,
    state: RwLock<HeadTail>,
}

impl SharedControlBlock {
    /// Spec §4.9 Init: `head = (0, 0)`. Per the §9 Open Question decision
    /// recorded in SPEC_FULL.md, `tail` is seeded equal to `head` rather
    /// than the `(max_page, 0)` sentinel.
    #[must_use]
    pub fn new(cfg: &Config) -> Self {
        let backend = (0..cfg.max_workers).map(|_| BackendSlot::new()).collect();
        Self {
            backend,
            state: RwLock::new(HeadTail {
                head: QueuePosition::ZERO,
                tail: QueuePosition::ZERO,
                last_full_warn: None,
            }),
        }
    }

    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.backend.len()
    }

    #[must_use]
    pub fn head(&self) -> QueuePosition {
        self.state.read().head
    }

    #[must_use]
    pub fn tail(&self) -> QueuePosition {
        self.state.read().tail
    }

    #[must_use]
    pub fn backend(&self, slot: usize) -> &BackendSlot {
        &self.backend[slot]
    }

    /// Acquire `QueueLock` in shared mode.
    #[must_use]
    pub fn lock_shared(&self) -> SharedGuard<'_> {
        SharedGuard {
            block: self,
            guard: self.state.read(),
        }
    }

    /// Acquire `QueueLock` in exclusive mode.
    #[must_use]
    pub fn lock_exclusive(&self) -> ExclusiveGuard<'_> {
        ExclusiveGuard {
            block: self,
            guard: self.state.write(),
        }
    }
}

/// `QueueLock` held in shared mode: read-only access to `head`/`tail`, plus
/// the ability to update *only the caller's own* backend slot (the atomic
/// fields on [`BackendSlot`] make that sound without an exclusive guard).
pub struct SharedGuard<'a> {
    block: &'a SharedControlBlock,
    guard: RwLockReadGuard<'a, HeadTail>,
}

impl<'a> SharedGuard<'a> {
    #[must_use]
    pub fn head(&self) -> QueuePosition {
        self.guard.head
    }

    #[must_use]
    pub fn tail(&self) -> QueuePosition {
        self.guard.tail
    }

    #[must_use]
    pub fn backend(&self, slot: usize) -> &'a BackendSlot {
        self.block.backend(slot)
    }
}

/// `QueueLock` held exclusively: full read/write access to `head`/`tail`
/// and every backend slot.
pub struct ExclusiveGuard<'a> {
    block: &'a SharedControlBlock,
    guard: RwLockWriteGuard<'a, HeadTail>,
}

impl<'a> ExclusiveGuard<'a> {
    #[must_use]
    pub fn head(&self) -> QueuePosition {
        self.guard.head
    }

    #[must_use]
    pub fn tail(&self) -> QueuePosition {
        self.guard.tail
    }

    pub fn set_head(&mut self, pos: QueuePosition) {
        self.guard.head = pos;
    }

    pub fn set_tail(&mut self, pos: QueuePosition) {
        self.guard.tail = pos;
    }

    #[must_use]
    pub fn backend(&self, slot: usize) -> &'a BackendSlot {
        self.block.backend(slot)
    }

    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.block.max_workers()
    }

    /// Spec §4.2 `is_full`: simulates writing a maximally sized entry from
    /// `head`; the queue is full iff doing so would jump to the page the
    /// tail currently occupies. Requires the exclusive lock already be
    /// held (this does not re-acquire it).
    #[must_use]
    pub fn is_full(&self, cfg: &Config) -> bool {
        position::is_full(self.head(), self.tail(), cfg)
    }

    /// Spec §4.4 warning rule: while holding the lock in an `is_full`
    /// state, compute the slowest listener's pid and, if the last warning
    /// was longer than `full_warn_interval` ago, return its pid and record
    /// `now` as the new warning timestamp. Returns `None` if a warning was
    /// emitted too recently.
    pub fn maybe_warn_full(&mut self, cfg: &Config, now: Instant) -> Option<i32> {
        let due = match self.guard.last_full_warn {
            None => true,
            Some(last) => now.duration_since(last) >= cfg.full_warn_interval,
        };
        if !due {
            return None;
        }
        self.guard.last_full_warn = Some(now);
        self.slowest_backend_pid()
    }

    fn slowest_backend_pid(&self) -> Option<i32> {
        let head = self.head();
        let mut slowest: Option<(QueuePosition, i32)> = None;
        for i in 0..self.max_workers() {
            let slot = self.backend(i);
            if !slot.is_active() {
                continue;
            }
            let pos = slot.position();
            slowest = Some(match slowest {
                None => (pos, slot.pid()),
                Some((cur_pos, cur_pid)) => {
                    if position::logical_cmp(pos, cur_pos, head) == std::cmp::Ordering::Less {
                        (pos, slot.pid())
                    } else {
                        (cur_pos, cur_pid)
                    }
                }
            });
        }
        slowest.map(|(_, pid)| pid)
    }
}
