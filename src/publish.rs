//! The publish path run at pre-commit (spec §4.4) and tail advancement
//! (spec §4.5). `Worker::publish` (in `worker.rs`) drives the overflow
//! retry loop around [`append_pending`]; this module owns the page-level
//! append algorithm and the logical tail computation, both of which need
//! only `SharedControlBlock` + `PagedStore`, not a whole `Worker`.

use crate::config::Config;
use crate::control::SharedControlBlock;
use crate::entry::{Notification, QueueEntry};
use crate::error::{NotifyError, Result};
use crate::position::{self, QueuePosition};
use crate::store::{PageAccess, PagedStore};
use std::time::Instant;

/// Result of one [`append_pending`] call.
pub struct AppendOutcome {
    /// Notifications that did not fit because the queue became full;
    /// non-empty only when the overflow protocol must run.
    pub remaining: Vec<Notification>,
    /// A listener pid to warn about, if the full-warning interval elapsed
    /// while we were stuck.
    pub warn_pid: Option<i32>,
}

/// Spec §4.4 append algorithm, run while holding `QueueLock` exclusively
/// for the whole call. Encodes and writes as many of `pending` as fit,
/// stopping (without consuming more) the moment the queue reports full.
pub fn append_pending(
    control: &SharedControlBlock,
    store: &dyn PagedStore,
    cfg: &Config,
    database_id: u32,
    source_pid: i32,
    xid: u64,
    mut pending: Vec<Notification>,
) -> Result<AppendOutcome> {
    if pending.is_empty() {
        return Ok(AppendOutcome {
            remaining: pending,
            warn_pid: None,
        });
    }

    let mut guard = control.lock_exclusive();
    let mut head = guard.head();
    let mut page = store
        .read_page(head.page, PageAccess::Exclusive)
        .map_err(|e| NotifyError::Store(Box::new(e)))?;
    let mut warn_pid = None;

    let mut i = 0;
    while i < pending.len() {
        if guard.is_full(cfg) {
            warn_pid = guard.maybe_warn_full(cfg, Instant::now());
            break;
        }

        let mut n = pending[i].clone();
        n.xid = xid;
        n.peer_pid = source_pid;
        let entry = QueueEntry::encode_notification(&n, database_id, source_pid, cfg);

        let fits = head.offset + entry.length < cfg.page_size;
        let written_len = if fits {
            entry.write_into(&mut page[head.offset as usize..], cfg);
            entry.length
        } else {
            let filler = QueueEntry::filler(head.offset, cfg);
            filler.write_into(&mut page[head.offset as usize..], cfg);
            filler.length
        };
        store
            .write_page(head.page, &page)
            .map_err(|e| NotifyError::Store(Box::new(e)))?;

        let (new_pos, jumped) = position::advance(head, written_len, cfg);
        if jumped {
            page = store
                .zero_new_page(new_pos.page)
                .map_err(|e| NotifyError::Store(Box::new(e)))?;
        }
        head = new_pos;
        guard.set_head(head);

        if fits {
            i += 1;
        }
        // else: filler consumed the rest of the page, retry the same
        // notification on the freshly entered page.
    }

    if head.offset == 0 {
        // Step 3: pre-zero the next page so a subsequent writer never has
        // to do it under contention.
        let _ = store
            .zero_new_page(cfg.next_page(head.page))
            .map_err(|e| NotifyError::Store(Box::new(e)))?;
    }

    pending.drain(..i);
    Ok(AppendOutcome {
        remaining: pending,
        warn_pid,
    })
}

/// Spec §4.5 `advance_tail`. Computes the logical minimum of `head` and
/// every active backend's position, installs it as the new `tail`, and
/// truncates whole freed segments when the freed range is at least
/// `segment_pages` and both logically and physically forward of the old
/// tail (avoiding gratuitous truncate calls for small advances).
pub fn advance_tail(control: &SharedControlBlock, store: &dyn PagedStore, cfg: &Config) -> Result<()> {
    let mut guard = control.lock_exclusive();
    let head = guard.head();
    let mut min = head;
    for i in 0..guard.max_workers() {
        let slot = guard.backend(i);
        if slot.is_active() {
            min = position::logical_min(min, slot.position(), head);
        }
    }
    let tail_page_before = guard.tail().page;
    let head_page = head.page;
    guard.set_tail(min);
    drop(guard);

    let new_tail_page = min.page;
    let logically_forward = position::logically_precedes_or_eq(
        QueuePosition::new(tail_page_before, 0),
        QueuePosition::new(new_tail_page, 0),
        QueuePosition::new(head_page, 0),
    ) && tail_page_before != new_tail_page;
    // Guard against truncating across a wraparound: only proceed if the old
    // tail physically precedes head (`asyncQueueAdvanceTail`,
    // `asyncQueuePagePrecedesPhysically(tailPage, headPage)`). Comparing the
    // new tail to the old tail instead of consulting `head_page` would let
    // this fire once head wraps past a low page number while a lagging
    // backend is still parked at a high pre-wrap page, truncating segments
    // head is currently writing into.
    let physically_forward = tail_page_before < head_page;
    let freed_pages = new_tail_page.saturating_sub(tail_page_before);

    if logically_forward && physically_forward && freed_pages >= cfg.segment_pages {
        store
            .truncate_up_to(new_tail_page)
            .map_err(|e| NotifyError::Store(Box::new(e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPagedStore;

    fn small_cfg() -> Config {
        Config {
            page_size: 256,
            max_chan: 16,
            max_payload: 64,
            segment_pages: 2,
            max_page: 7,
            max_workers: 4,
            ..Config::default()
        }
    }

    #[test]
    fn append_writes_entries_and_advances_head() {
        let cfg = small_cfg();
        let control = SharedControlBlock::new(&cfg);
        let store = MemoryPagedStore::new(cfg);
        store.zero_new_page(0).unwrap();

        let pending = vec![Notification::new("chan", "hello"), Notification::new("chan", "world")];
        let outcome = append_pending(&control, &store, &cfg, 1, 100, 42, pending).unwrap();
        assert!(outcome.remaining.is_empty());
        assert!(control.head().offset > 0);
    }

    #[test]
    fn advance_tail_tracks_slowest_active_backend() {
        let cfg = small_cfg();
        let control = SharedControlBlock::new(&cfg);
        let store = MemoryPagedStore::new(cfg);
        store.zero_new_page(0).unwrap();

        // Publish enough to move head forward a bit.
        let pending = vec![Notification::new("c", "x")];
        append_pending(&control, &store, &cfg, 1, 1, 1, pending).unwrap();

        let slot = control.backend(0);
        slot.set_pid(55);
        slot.set_position(QueuePosition::ZERO);

        advance_tail(&control, &store, &cfg).unwrap();
        assert_eq!(control.tail(), QueuePosition::ZERO);
    }
}
