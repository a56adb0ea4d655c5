//! Bounded event channel with drop-oldest backpressure.
//!
//! Producers never block: when the channel is full the oldest queued item is
//! evicted to make room, so the newest event is always retained. Evictions are
//! counted per event kind.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Inner<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    evictions: Mutex<BTreeMap<String, u64>>,
}

/// Cloneable handle to one bounded queue.
pub struct EventChannel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for EventChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> EventChannel<T> {
    /// Create a channel holding at most `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                sender,
                receiver,
                evictions: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Enqueue without blocking, evicting the oldest item if full.
    ///
    /// Returns the evicted item, if any, so the caller can audit it.
    pub fn publish(&self, kind: &str, item: T) -> Option<T> {
        let mut item = item;
        let mut evicted = None;

        loop {
            match self.inner.sender.try_send(item) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(back)) => {
                    item = back;
                    // A consumer may have drained the queue in between.
                    if let Ok(oldest) = self.inner.receiver.try_recv() {
                        self.count_eviction(kind);
                        evicted = Some(oldest);
                    }
                }
                // Both ends live in `inner`, so this cannot happen while
                // the handle exists.
                Err(TrySendError::Disconnected(_)) => return evicted,
            }
        }
    }

    fn count_eviction(&self, kind: &str) {
        let mut evictions = self.inner.evictions.lock().unwrap_or_else(|e| e.into_inner());
        *evictions.entry(kind.to_string()).or_insert(0) += 1;
    }

    /// Wait up to `timeout` for the next item.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        match self.inner.receiver.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<T> {
        self.inner.receiver.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.inner.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.sender.capacity().unwrap_or(1)
    }

    /// Items of `kind` evicted so far.
    pub fn evictions(&self, kind: &str) -> u64 {
        self.inner
            .evictions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(kind)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_evictions(&self) -> u64 {
        self.inner
            .evictions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .sum()
    }
}
