//! Per-worker subscription set (spec §3 "Per-worker state", §4.3). Purely
//! process-local — no shared-memory footprint, matching spec's Non-goal of
//! "per-channel subscription indexing in shared memory".

use std::collections::HashSet;

/// The set of channels this worker is currently subscribed to, plus
/// whether the exit-time auto-unsubscribe hook has been registered.
#[derive(Default)]
pub struct SubscriptionSet {
    channels: HashSet<String>,
    exit_hook_registered: bool,
}

impl SubscriptionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    #[must_use]
    pub fn exit_hook_registered(&self) -> bool {
        self.exit_hook_registered
    }

    pub fn mark_exit_hook_registered(&mut self) {
        self.exit_hook_registered = true;
    }

    /// Add a channel (idempotent). Returns `true` if this was the worker's
    /// first channel — the caller uses this to decide whether it needs to
    /// register its backend slot (spec §4.3 `Subscribe`).
    pub fn insert(&mut self, channel: &str) -> bool {
        let was_empty = self.channels.is_empty();
        self.channels.insert(channel.to_string());
        was_empty && !self.channels.is_empty()
    }

    /// Remove a channel. Unsubscribing from a channel never subscribed to
    /// is silently ignored (§9 Open Question decision). Returns `true` if
    /// the set is now empty (caller releases the backend slot).
    pub fn remove(&mut self, channel: &str) -> bool {
        self.channels.remove(channel);
        self.channels.is_empty()
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_first_channel_only() {
        let mut s = SubscriptionSet::new();
        assert!(s.insert("a"));
        assert!(!s.insert("b"));
        assert!(!s.insert("a")); // idempotent, not "first" again
    }

    #[test]
    fn remove_unknown_channel_is_a_silent_noop() {
        let mut s = SubscriptionSet::new();
        s.insert("a");
        assert!(!s.remove("never-subscribed"));
        assert!(s.is_subscribed("a"));
    }

    #[test]
    fn remove_last_channel_reports_empty() {
        let mut s = SubscriptionSet::new();
        s.insert("a");
        assert!(s.remove("a"));
        assert!(s.is_empty());
    }
}
