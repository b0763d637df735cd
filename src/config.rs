//! Tunable constants and the external config surface named in spec §6.
//!
//! Reference values match the PostgreSQL LISTEN/NOTIFY implementation this
//! subsystem is modeled on (`NOTIFY_PAYLOAD_MAX_LENGTH`, `NAMEDATALEN`,
//! `BLCKSZ`, `SLRU_PAGES_PER_SEGMENT`, `QUEUE_FULL_WARN_INTERVAL`).

use std::time::Duration;

/// Sentinel for "no pid" in a backend slot.
pub const INVALID_PID: i32 = -1;
/// Sentinel for "no transaction" / a filler entry's xid.
pub const INVALID_XID: u64 = 0;
/// Sentinel for "no database" / a filler entry's database id.
pub const INVALID_DB: u32 = 0;

/// Numeric and boolean knobs consumed from the host server's configuration.
///
/// Mirrors the teacher crate's [`Config`]-as-plain-struct style: small,
/// `Copy`, constructed once, passed by reference everywhere instead of
/// threaded through as loose arguments.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Maximum payload length in bytes, excluding the trailing NUL.
    pub max_payload: usize,
    /// Maximum channel name length in bytes, excluding the trailing NUL.
    pub max_chan: usize,
    /// Size of one page in the paged log store.
    pub page_size: u32,
    /// Number of consecutive pages per truncatable segment.
    pub segment_pages: u32,
    /// Highest legal page id; positions wrap from `max_page` back to `0`.
    pub max_page: u32,
    /// Number of backend slots in the shared control block.
    pub max_workers: usize,
    /// Minimum spacing between two "queue full" warnings.
    pub full_warn_interval: Duration,
    /// Sleep between overflow-protocol retries.
    pub overflow_retry_sleep: Duration,
    /// Mirrors the `Trace_notify` GUC: emit step-by-step trace logging.
    pub trace_notify: bool,
}

impl Config {
    /// Fixed on-disk header size of a queue entry: `length(u32) +
    /// database_id(u32) + xid(u64) + source_pid(i32)`.
    pub const ENTRY_HEADER_SIZE: usize = 4 + 4 + 8 + 4;

    /// `AsyncQueueEntryEmptySize` equivalent: the smallest an entry can be
    /// (fixed header, a full-size channel slot, and a lone payload NUL).
    #[must_use]
    pub fn min_entry_size(&self) -> usize {
        Self::ENTRY_HEADER_SIZE + self.max_chan + 1
    }

    /// Largest an entry can ever be: min size plus a maximal payload.
    #[must_use]
    pub fn max_entry_size(&self) -> usize {
        self.min_entry_size() + self.max_payload
    }

    /// `page + 1`, wrapping past `max_page` back to `0`.
    #[must_use]
    pub fn next_page(&self, page: u32) -> u32 {
        if page >= self.max_page {
            0
        } else {
            page + 1
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_payload: 8000,
            max_chan: 64,
            page_size: 8192,
            segment_pages: 32,
            max_page: 32 * 0xFFFF,
            max_workers: 64,
            full_warn_interval: Duration::from_secs(5),
            overflow_retry_sleep: Duration::from_millis(100),
            trace_notify: false,
        }
    }
}
