//! Bounded FIFO event channel.
//!
//! The channel is the only structure shared between a native subsystem's
//! callback context and the scripting runtime's poll loop. Both sides are
//! non-blocking: a producer that finds the channel full fails fast and keeps
//! ownership of the record so it can release it, and a consumer that finds
//! the channel empty gets `None`.
//!
//! Bounded capacity turns unbounded memory growth under event storms into
//! bounded, observable event loss: the newest attempted record is the one
//! dropped, records already queued are never discarded out of order.
//!
//! Teardown is a one-way transition (Active -> Draining -> Closed) driven by
//! [`EventReceiver::drain_and_close`]: once draining begins no further
//! records can be enqueued, and a channel is never reused across sessions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::event::EventRecord;

/// Default channel capacity used by subsystem sessions.
pub const DEFAULT_CAPACITY: usize = 100;

/// Error returned by [`EventSender::try_send`].
///
/// Both variants hand the record back to the caller, which keeps ownership
/// and is responsible for releasing it (dropping it suffices).
#[derive(Debug, Error)]
pub enum TrySendError {
    /// The channel is at capacity; the record was not enqueued.
    #[error("event channel is full")]
    Full(EventRecord),

    /// The channel has been closed; the record was not enqueued.
    #[error("event channel is closed")]
    Closed(EventRecord),
}

impl TrySendError {
    /// Recover the record that could not be sent.
    pub fn into_record(self) -> EventRecord {
        match self {
            TrySendError::Full(record) | TrySendError::Closed(record) => record,
        }
    }
}

struct Shared {
    queue: Mutex<VecDeque<EventRecord>>,
    capacity: usize,
    closed: AtomicBool,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<EventRecord>> {
        // A poisoned queue only means a panic elsewhere while holding the
        // lock; the records themselves are still valid.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producer half of the channel; held by bridge adapters.
///
/// Clonable so multiple handlers of one subsystem session can share it, but
/// all clones feed the same bounded queue.
#[derive(Clone)]
pub struct EventSender {
    shared: Arc<Shared>,
}

impl EventSender {
    /// Enqueue a record without blocking.
    ///
    /// On failure the record is handed back inside the error so the caller
    /// can release it; the producer context is never stalled.
    pub fn try_send(&self, record: EventRecord) -> Result<(), TrySendError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(TrySendError::Closed(record));
        }
        let mut queue = self.shared.lock();
        if queue.len() >= self.shared.capacity {
            return Err(TrySendError::Full(record));
        }
        queue.push_back(record);
        Ok(())
    }

    /// Number of records currently queued.
    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.shared.lock().is_empty()
    }

    /// The immutable capacity this channel was created with.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Whether the consumer has begun teardown.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// Consumer half of the channel; held by the subsystem session and polled
/// from the scripting runtime.
pub struct EventReceiver {
    shared: Arc<Shared>,
}

impl EventReceiver {
    /// Dequeue the oldest record without blocking.
    ///
    /// `None` means the channel is currently empty, not that it failed.
    /// Ownership of the returned record moves entirely to the caller.
    pub fn try_recv(&mut self) -> Option<EventRecord> {
        self.shared.lock().pop_front()
    }

    /// Close the channel and release every unconsumed record.
    ///
    /// After this returns no further records can be enqueued and none remain
    /// retrievable. Returns how many unconsumed records were released, the
    /// observable event deficit of this session.
    pub fn drain_and_close(&mut self) -> usize {
        self.shared.closed.store(true, Ordering::Release);
        let mut queue = self.shared.lock();
        let released = queue.len();
        queue.clear();
        released
    }

    /// Number of records currently queued.
    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.shared.lock().is_empty()
    }

    /// The immutable capacity this channel was created with.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        // The consumer going away retires the channel; producers observe
        // Closed instead of filling a queue nobody will ever drain.
        let _ = self.drain_and_close();
    }
}

/// Create a bounded channel with the given capacity.
///
/// Capacity is fixed for the lifetime of the channel. A channel belongs to
/// exactly one subsystem session; sessions create a fresh one on start and
/// drain it on stop.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn channel(capacity: usize) -> (EventSender, EventReceiver) {
    assert!(capacity > 0, "event channel capacity must be nonzero");
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity,
        closed: AtomicBool::new(false),
    });
    (
        EventSender {
            shared: shared.clone(),
        },
        EventReceiver { shared },
    )
}
