//! Transaction-local buffers: pending LISTEN/UNLISTEN actions and pending
//! outbound notifications, with a nesting stack for subtransactions. See
//! spec §3 "Per-transaction state" and §4.8.

use crate::config::Config;
use crate::entry::Notification;
use crate::error::{NotifyError, Result};

/// A buffered LISTEN/UNLISTEN/UNLISTEN-ALL action, applied in order at
/// pre-commit (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAction {
    Subscribe(String),
    Unsubscribe(String),
    UnsubscribeAll,
}

/// One nesting level's buffers.
#[derive(Default)]
struct Scope {
    pending_actions: Vec<ListenAction>,
    pending_notifications: Vec<Notification>,
}

/// Everything a single top-level transaction (and its live subtransaction)
/// has staged so far. Reset at `at_abort`/`at_precommit`.
#[derive(Default)]
pub struct TxnState {
    current: Scope,
    parent_stack: Vec<Scope>,
}

impl TxnState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn nest_level(&self) -> usize {
        self.parent_stack.len() + 1
    }

    #[must_use]
    pub fn pending_actions(&self) -> &[ListenAction] {
        &self.current.pending_actions
    }

    #[must_use]
    pub fn pending_notifications(&self) -> &[Notification] {
        &self.current.pending_notifications
    }

    #[must_use]
    pub fn has_pending_actions(&self) -> bool {
        !self.current.pending_actions.is_empty()
    }

    /// Stage a `LISTEN channel`.
    pub fn stage_subscribe(&mut self, channel: &str, cfg: &Config) -> Result<()> {
        validate_channel(channel, cfg)?;
        self.current
            .pending_actions
            .push(ListenAction::Subscribe(channel.to_string()));
        Ok(())
    }

    /// Stage an `UNLISTEN channel`. Short-circuits (does nothing) if there
    /// are no pending actions yet this transaction and the worker has
    /// never registered its exit-unsubscribe hook — in that state it
    /// cannot possibly be subscribed to anything (spec §4.3).
    pub fn stage_unsubscribe(&mut self, channel: &str, exit_hook_registered: bool, cfg: &Config) -> Result<()> {
        validate_channel(channel, cfg)?;
        if self.current.pending_actions.is_empty() && !exit_hook_registered {
            return Ok(());
        }
        self.current
            .pending_actions
            .push(ListenAction::Unsubscribe(channel.to_string()));
        Ok(())
    }

    /// Stage `UNLISTEN *`. Same short-circuit as `stage_unsubscribe`.
    pub fn stage_unsubscribe_all(&mut self, exit_hook_registered: bool) {
        if self.current.pending_actions.is_empty() && !exit_hook_registered {
            return;
        }
        self.current.pending_actions.push(ListenAction::UnsubscribeAll);
    }

    /// Stage a `NOTIFY channel, payload`. Collapses duplicates by
    /// `(channel, payload)` equality: checks the tail element first (the
    /// common case — repeated notifies of the same thing in a loop), then
    /// scans the rest (spec §4.4's stated optimization). Preserves
    /// insertion order.
    pub fn stage_publish(&mut self, channel: &str, payload: &str, cfg: &Config) -> Result<()> {
        validate_channel(channel, cfg)?;
        if payload.len() > cfg.max_payload {
            return Err(NotifyError::PayloadTooLong {
                len: payload.len(),
                max: cfg.max_payload,
            });
        }

        let candidate = Notification::new(channel, payload);

        if let Some(last) = self.current.pending_notifications.last() {
            if last.same_channel_payload(&candidate) {
                return Ok(());
            }
            let rest = &self.current.pending_notifications[..self.current.pending_notifications.len() - 1];
            if rest.iter().any(|n| n.same_channel_payload(&candidate)) {
                return Ok(());
            }
        }

        self.current.pending_notifications.push(candidate);
        Ok(())
    }

    /// Sub-start (spec §4.8): push the current scope, start fresh.
    pub fn sub_start(&mut self) {
        self.parent_stack.push(std::mem::take(&mut self.current));
    }

    /// Sub-commit (spec §4.8): concatenate parent's pending lists with
    /// ours (parent first, preserving order), no re-collapsing of
    /// duplicates across the boundary.
    ///
    /// # Panics
    /// Panics if called without a matching `sub_start` — a programmer
    /// error in the caller's transaction-manager integration.
    pub fn sub_commit(&mut self) {
        let child = std::mem::take(&mut self.current);
        let mut parent = self
            .parent_stack
            .pop()
            .expect("sub_commit called without a matching sub_start");
        parent.pending_actions.extend(child.pending_actions);
        parent.pending_notifications.extend(child.pending_notifications);
        self.current = parent;
    }

    /// Sub-abort (spec §4.8): discard the current scope's pending lists,
    /// restore the parent.
    ///
    /// # Panics
    /// Panics if called without a matching `sub_start`.
    pub fn sub_abort(&mut self) {
        self.current = self
            .parent_stack
            .pop()
            .expect("sub_abort called without a matching sub_start");
    }

    /// Top-level abort (spec §4.8): nothing has been written yet, so this
    /// just clears both pending lists (and any stray subtransaction
    /// frames, in case abort fires mid-nesting).
    pub fn abort(&mut self) {
        self.current = Scope::default();
        self.parent_stack.clear();
    }

    /// Take everything staged for pre-commit processing, leaving this
    /// state reset for the next transaction.
    pub fn take_for_commit(&mut self) -> (Vec<ListenAction>, Vec<Notification>) {
        let scope = std::mem::take(&mut self.current);
        self.parent_stack.clear();
        (scope.pending_actions, scope.pending_notifications)
    }
}

fn validate_channel(channel: &str, cfg: &Config) -> Result<()> {
    if channel.len() >= cfg.max_chan {
        return Err(NotifyError::ChannelNameTooLong {
            len: channel.len(),
            max: cfg.max_chan,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_notifications_collapse() {
        let mut txn = TxnState::new();
        let cfg = Config::default();
        txn.stage_publish("c", "x", &cfg).unwrap();
        txn.stage_publish("c", "x", &cfg).unwrap();
        txn.stage_publish("c", "x", &cfg).unwrap();
        txn.stage_publish("c", "y", &cfg).unwrap();
        let (_, notes) = txn.take_for_commit();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].payload, "x");
        assert_eq!(notes[1].payload, "y");
    }

    #[test]
    fn subtransaction_commit_preserves_order_without_recollapsing() {
        let mut txn = TxnState::new();
        let cfg = Config::default();
        txn.stage_publish("c", "outer", &cfg).unwrap();
        txn.sub_start();
        txn.stage_publish("c", "outer", &cfg).unwrap(); // same pair as parent's, but parent is hidden now
        txn.sub_commit();
        let (_, notes) = txn.take_for_commit();
        // No cross-scope dedup: both "outer" entries survive.
        assert_eq!(notes.len(), 2);
    }

    #[test]
    fn subtransaction_abort_discards_its_notifications() {
        let mut txn = TxnState::new();
        let cfg = Config::default();
        txn.stage_publish("c", "keep", &cfg).unwrap();
        txn.sub_start();
        txn.stage_publish("c", "discard", &cfg).unwrap();
        txn.sub_abort();
        let (_, notes) = txn.take_for_commit();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].payload, "keep");
    }

    #[test]
    fn unsubscribe_short_circuits_when_nothing_could_be_subscribed() {
        let mut txn = TxnState::new();
        txn.stage_unsubscribe("c", false, &Config::default()).unwrap();
        assert!(txn.pending_actions().is_empty());
    }
}
