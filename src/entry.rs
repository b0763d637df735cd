//! On-page wire format of a queue entry, and the in-memory `Notification`
//! record. See spec §3 "Queue entry" and §4.4 "Encoding".

use crate::config::{Config, INVALID_DB, INVALID_PID, INVALID_XID};

/// A notification staged for publish or delivered to a consumer.
///
/// `peer_pid` is the destination pid pre-encode (currently unused, staging
/// only ever needs the channel/payload/xid) or the source pid post-decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Channel name, unterminated (no embedded NUL).
    pub channel: String,
    /// Payload text, unterminated (no embedded NUL). Empty if none given.
    pub payload: String,
    /// Transaction id that published this notification.
    pub xid: u64,
    /// Source/destination pid, depending on direction (see type docs).
    pub peer_pid: i32,
}

impl Notification {
    /// New staged notification, defaulting `xid`/`peer_pid` to be filled in
    /// at encode time.
    #[must_use]
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
            xid: INVALID_XID,
            peer_pid: INVALID_PID,
        }
    }

    /// Two notifications are duplicates (for collapsing purposes) iff their
    /// `(channel, payload)` pair matches. Per spec §3/§4.4.
    #[must_use]
    pub fn same_channel_payload(&self, other: &Self) -> bool {
        self.channel == other.channel && self.payload == other.payload
    }
}

/// A decoded queue entry: either a real notification or a filler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Total serialized length on the page, including header and NULs.
    pub length: u32,
    /// `INVALID_DB` marks this as a filler entry.
    pub database_id: u32,
    /// `INVALID_XID` on filler entries.
    pub xid: u64,
    pub source_pid: i32,
    pub channel: String,
    pub payload: String,
}

impl QueueEntry {
    /// True for a filler entry inserted to round out a page (§3).
    #[must_use]
    pub fn is_filler(&self) -> bool {
        self.database_id == INVALID_DB
    }

    /// Build the on-page entry for a real notification, per §4.4's encoding
    /// rule: `length = min_entry_size + strlen(payload)`.
    #[must_use]
    pub fn encode_notification(
        n: &Notification,
        database_id: u32,
        source_pid: i32,
        cfg: &Config,
    ) -> Self {
        debug_assert!(
            n.payload.len() <= cfg.max_payload,
            "payload length {} exceeds max_payload {} (caller must validate before this point)",
            n.payload.len(),
            cfg.max_payload
        );
        debug_assert!(
            n.channel.len() < cfg.max_chan,
            "channel length {} exceeds max_chan {}",
            n.channel.len(),
            cfg.max_chan
        );
        Self {
            length: (cfg.min_entry_size() + n.payload.len()) as u32,
            database_id,
            xid: n.xid,
            source_pid,
            channel: n.channel.clone(),
            payload: n.payload.clone(),
        }
    }

    /// Build a filler entry consuming the remainder of a page (§4.4 step
    /// 2d): `length = page_size - offset - 1`, invalid database/xid, empty
    /// channel/payload.
    #[must_use]
    pub fn filler(offset: u32, cfg: &Config) -> Self {
        Self {
            length: cfg.page_size - offset - 1,
            database_id: INVALID_DB,
            xid: INVALID_XID,
            source_pid: INVALID_PID,
            channel: String::new(),
            payload: String::new(),
        }
    }

    /// Serialize this entry's header + channel + payload into `buf`
    /// starting at `buf[0]`. Returns the number of header-region bytes
    /// written (not `self.length`, which may exceed this for fillers that
    /// only need their header to be parseable).
    ///
    /// Layout: `length:u32 | database_id:u32 | xid:u64 | source_pid:i32 |
    /// channel (NUL-terminated, fixed `max_chan` bytes) | payload
    /// (NUL-terminated, variable)`.
    pub fn write_into(&self, buf: &mut [u8], cfg: &Config) -> usize {
        let mut w = 0;
        buf[w..w + 4].copy_from_slice(&self.length.to_le_bytes());
        w += 4;
        buf[w..w + 4].copy_from_slice(&self.database_id.to_le_bytes());
        w += 4;
        buf[w..w + 8].copy_from_slice(&self.xid.to_le_bytes());
        w += 8;
        buf[w..w + 4].copy_from_slice(&self.source_pid.to_le_bytes());
        w += 4;

        // Channel occupies a fixed-width slot so the payload always starts
        // at the same offset regardless of the actual channel length.
        let chan_bytes = self.channel.as_bytes();
        buf[w..w + chan_bytes.len()].copy_from_slice(chan_bytes);
        buf[w + chan_bytes.len()] = 0;
        w += cfg.max_chan;

        let payload_bytes = self.payload.as_bytes();
        buf[w..w + payload_bytes.len()].copy_from_slice(payload_bytes);
        buf[w + payload_bytes.len()] = 0;
        w += payload_bytes.len() + 1;

        w
    }

    /// Parse a queue entry out of `buf`, which must start at the entry's
    /// first byte and be at least `min_entry_size()` bytes long.
    #[must_use]
    pub fn read_from(buf: &[u8], cfg: &Config) -> Self {
        let mut r = 0;
        let length = u32::from_le_bytes(buf[r..r + 4].try_into().unwrap());
        r += 4;
        let database_id = u32::from_le_bytes(buf[r..r + 4].try_into().unwrap());
        r += 4;
        let xid = u64::from_le_bytes(buf[r..r + 8].try_into().unwrap());
        r += 8;
        let source_pid = i32::from_le_bytes(buf[r..r + 4].try_into().unwrap());
        r += 4;

        let chan_slot = &buf[r..r + cfg.max_chan];
        let chan_len = chan_slot.iter().position(|&b| b == 0).unwrap_or(chan_slot.len());
        let channel = String::from_utf8_lossy(&chan_slot[..chan_len]).into_owned();
        let payload_start = r + cfg.max_chan;

        let payload = if database_id == INVALID_DB {
            String::new()
        } else {
            let remaining = &buf[payload_start..];
            let payload_len = remaining.iter().position(|&b| b == 0).unwrap_or(0);
            String::from_utf8_lossy(&remaining[..payload_len]).into_owned()
        };

        Self {
            length,
            database_id,
            xid,
            source_pid,
            channel,
            payload,
        }
    }
}
