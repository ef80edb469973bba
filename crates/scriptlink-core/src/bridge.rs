//! Bridge adapter support.
//!
//! Subsystem adapters run inside native callbacks that must not fail and
//! must not block: the callback's own event structure dies when the callback
//! returns, and the thread it runs on belongs to the network stack. The
//! bridge therefore copies first, forwards second, and swallows enqueue
//! failure into a counted deficit instead of an error.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::channel::EventSender;
use crate::event::EventRecord;

/// Wraps an [`EventSender`] with never-fail forwarding semantics.
///
/// When the channel is full (or already closing) the record is released
/// immediately and a deficit counter increments. The subsystem callback sees
/// nothing; the script observes fewer events than occurred, which is the
/// documented backpressure contract.
pub struct EventBridge {
    sender: EventSender,
    dropped: AtomicU64,
}

impl EventBridge {
    /// Wrap the producer half of a session's channel.
    pub fn new(sender: EventSender) -> Self {
        Self {
            sender,
            dropped: AtomicU64::new(0),
        }
    }

    /// Forward a record to the channel, dropping it if the channel refuses.
    pub fn forward(&self, record: EventRecord) {
        if self.sender.try_send(record).is_err() {
            // The rejected record is released here; delivery loss is
            // surfaced only through the deficit counter.
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// How many records have been dropped since the session started.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// The underlying sender, for adapters that need direct access.
    pub fn sender(&self) -> &EventSender {
        &self.sender
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::channel;
    use crate::event::{EventKind, EventRecord};

    #[test]
    fn test_forward_counts_deficit() {
        let (tx, mut rx) = channel(2);
        let bridge = EventBridge::new(tx);

        for n in 0..5 {
            bridge.forward(
                EventRecord::new(EventKind::Post).payload(n.to_string().into_bytes()),
            );
        }

        assert_eq!(bridge.dropped(), 3);

        // The two records that fit are still delivered in order.
        assert_eq!(rx.try_recv().unwrap().payload_lossy().unwrap(), "0");
        assert_eq!(rx.try_recv().unwrap().payload_lossy().unwrap(), "1");
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_forward_after_close_is_silent() {
        let (tx, mut rx) = channel(2);
        let bridge = EventBridge::new(tx);

        rx.drain_and_close();
        bridge.forward(EventRecord::new(EventKind::Error));

        assert_eq!(bridge.dropped(), 1);
    }
}
