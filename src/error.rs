//! Crate error type. See spec §7 "Error Handling Design".
//!
//! Invariant violations (encoding length overflow, channel too long,
//! out-of-range positions) are `debug_assert!`s at the call site, the way
//! the teacher crate enforces `INV-SEQ-*` with `debug_assert!` macros in
//! `invariants.rs` rather than returning a `Result` for programmer errors.
//! This enum carries only the recoverable, caller-visible error kinds.

use thiserror::Error;

/// Errors surfaced to callers of the public API.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// `publish` was called with a payload longer than `Config::max_payload`.
    #[error("payload length {len} exceeds max_payload {max}")]
    PayloadTooLong {
        /// Length of the offending payload, in bytes.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// `subscribe`/`unsubscribe` was called with a channel name longer than
    /// `Config::max_chan`.
    #[error("channel name length {len} exceeds max_chan {max}")]
    ChannelNameTooLong {
        /// Length of the offending channel name, in bytes.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// `at_prepare` was called with pending LISTEN/UNLISTEN actions still
    /// buffered. Matches the original's "cannot PREPARE a transaction that
    /// has executed LISTEN/UNLISTEN" restriction.
    #[error("PREPARE is not supported for a transaction with pending subscription actions")]
    PrepareNotSupported,

    /// The paged store reported an I/O failure. Propagated to the caller of
    /// `publish`/pre-commit (which aborts the transaction); during the
    /// consume path this kind of error is logged and the reader skips
    /// forward instead of propagating (see SPEC_FULL.md §7).
    #[error("paged store I/O error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NotifyError>;
