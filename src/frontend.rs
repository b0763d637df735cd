//! `FrontendSink`: delivers decoded notifications to whatever is listening
//! on the other end of a worker's client connection (spec §6). Wire
//! framing beyond this interface is explicitly out of scope (spec §1
//! Non-goals).

use crate::entry::Notification;

/// Destination for notifications this worker has subscribed to receive.
/// `protocol_version` is read-only context the implementer uses to decide
/// whether the payload field is representable on the wire (spec's
/// "[SUPPLEMENT] Protocol version gate").
pub trait FrontendSink: Send + Sync {
    /// Protocol version negotiated with the connected client.
    fn protocol_version(&self) -> u8;

    /// Hand one decoded notification to the client-facing transport.
    fn send_notify(&self, notification: &Notification);

    /// Flush any buffered output after a batch of `send_notify` calls.
    fn flush_output(&self);
}

/// A `FrontendSink` that discards everything. Used where the consume path
/// requires a sink argument but the call site's `ConsumeMode` never invokes
/// it — e.g. the overflow protocol's self-drain, which only cares about
/// advancing the worker's own cursor, not about delivering anything.
#[derive(Default)]
pub struct NullSink;

impl FrontendSink for NullSink {
    fn protocol_version(&self) -> u8 {
        0
    }

    fn send_notify(&self, _notification: &Notification) {}

    fn flush_output(&self) {}
}

/// An in-process test double that records every delivered notification in
/// order, for assertions in integration tests.
#[derive(Default)]
pub struct RecordingSink {
    pub protocol_version: std::sync::atomic::AtomicU8,
    pub delivered: parking_lot::Mutex<Vec<Notification>>,
    pub flushes: std::sync::atomic::AtomicUsize,
}

impl RecordingSink {
    #[must_use]
    pub fn new(protocol_version: u8) -> Self {
        Self {
            protocol_version: std::sync::atomic::AtomicU8::new(protocol_version),
            delivered: parking_lot::Mutex::new(Vec::new()),
            flushes: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn take_delivered(&self) -> Vec<Notification> {
        std::mem::take(&mut self.delivered.lock())
    }
}

impl FrontendSink for RecordingSink {
    fn protocol_version(&self) -> u8 {
        self.protocol_version.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn send_notify(&self, notification: &Notification) {
        self.delivered.lock().push(notification.clone());
    }

    fn flush_output(&self) {
        self.flushes.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}
