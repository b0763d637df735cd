//! Queue positions and wrap-aware logical ordering. See spec §3, §4.2.

use crate::config::Config;
use std::cmp::Ordering;

/// A `(page, offset)` cursor into the paged log.
///
/// `page` wraps at `Config::max_page`; `offset` is always `< page_size`.
/// Cheap `Copy` value type, same treatment the teacher crate gives sequence
/// numbers in `ring.rs` (plain integers passed and compared by value, never
/// behind a reference).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueuePosition {
    /// Page id, `0..=max_page`.
    pub page: u32,
    /// Byte offset within the page, `0..page_size`.
    pub offset: u32,
}

impl QueuePosition {
    /// The origin position `(0, 0)`, used at init.
    pub const ZERO: Self = Self { page: 0, offset: 0 };

    /// New position at the given page/offset.
    #[must_use]
    pub fn new(page: u32, offset: u32) -> Self {
        Self { page, offset }
    }

    /// True if this position lies within `[0, max_page] x [0, page_size)`.
    #[must_use]
    pub fn in_range(&self, cfg: &Config) -> bool {
        self.page <= cfg.max_page && self.offset < cfg.page_size
    }

    /// Whether this position is on "head's own side": a page number not
    /// greater than the reference head's. Per spec §3: positions with
    /// `page ≤ head.page` compare numerically against each other and are
    /// logically newer than any position with `page > head.page`.
    fn near_side(self, head: Self) -> bool {
        self.page <= head.page
    }
}

/// Strict logical ordering of two positions relative to the current head,
/// per spec §3's "Logical relative to head H" rule. `Ordering::Less` means
/// `p` is logically older (earlier) than `q`.
#[must_use]
pub fn logical_cmp(p: QueuePosition, q: QueuePosition, head: QueuePosition) -> Ordering {
    match (p.near_side(head), q.near_side(head)) {
        (true, true) | (false, false) => (p.page, p.offset).cmp(&(q.page, q.offset)),
        // p is on head's side (newer region), q is in the wrapped-past
        // region: q is older, so p logically follows q.
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
    }
}

/// `true` if `p` logically precedes or equals `q` relative to `head`.
#[must_use]
pub fn logically_precedes_or_eq(p: QueuePosition, q: QueuePosition, head: QueuePosition) -> bool {
    logical_cmp(p, q, head) != Ordering::Greater
}

/// The logical minimum of `p` and `q` relative to `head`. Ties resolve to
/// `q`, matching `QUEUE_POS_MIN`'s fallthrough.
#[must_use]
pub fn logical_min(p: QueuePosition, q: QueuePosition, head: QueuePosition) -> QueuePosition {
    if logical_cmp(p, q, head) == Ordering::Less {
        p
    } else {
        q
    }
}

/// Advance `pos` past an entry of `entry_len` bytes. If fewer than
/// `cfg.min_entry_size()` bytes remain on the page afterward, jump to the
/// next page (wrapping past `max_page` to `0`) at offset `0`.
///
/// Returns the new position and whether a page jump occurred — callers use
/// the latter to decide whether to zero-initialize the freshly entered
/// page (§4.4 step 2e).
#[must_use]
pub fn advance(pos: QueuePosition, entry_len: u32, cfg: &Config) -> (QueuePosition, bool) {
    let offset = pos.offset + entry_len;
    debug_assert!(
        (offset as usize) < cfg.page_size as usize,
        "advance: offset {offset} would not fit on an {}-byte page",
        cfg.page_size
    );

    if (cfg.page_size - offset) as usize >= cfg.min_entry_size() {
        (QueuePosition::new(pos.page, offset), false)
    } else {
        (QueuePosition::new(cfg.next_page(pos.page), 0), true)
    }
}

/// Spec §4.2 `is_full`: would writing a maximal entry from `head` force a
/// page jump onto the page `tail` currently occupies? Caller must already
/// hold `QueueLock` exclusively.
#[must_use]
pub fn is_full(head: QueuePosition, tail: QueuePosition, cfg: &Config) -> bool {
    let remain = cfg.page_size - head.offset - 1;
    let advance_amt = remain.min(cfg.max_payload as u32);
    let (new_pos, jumped) = advance(head, advance_amt, cfg);
    jumped && new_pos.page == tail.page
}
