//! Unbounded pub/sub event queue with correlation and a bounded replay ring
//! (spec §4.3, C3).

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;

use dashmap::DashMap;
use tracing::warn;

use crate::ids::AtomicCounter;
use crate::protocol::EventEnvelope;
use crate::protocol::EventKind;
use crate::protocol::SubmissionId;

/// Default size of the replay ring (spec §4.3).
pub const DEFAULT_RETENTION: usize = 1024;

type Listener = Box<dyn Fn(&EventEnvelope) + Send + Sync>;

/// A handle returned by `subscribe*`. Call [`Unsubscribe::unsubscribe`] to
/// stop receiving events; dropping it without calling that method leaves
/// the listener registered.
pub struct Unsubscribe {
    id: u64,
    queue: std::sync::Arc<EventQueueInner>,
}

impl Unsubscribe {
    pub fn unsubscribe(self) {
        self.queue.listeners.remove(&self.id);
    }
}

struct EventQueueInner {
    listeners: DashMap<u64, Listener>,
    listener_ids: AtomicCounter,
    retention: usize,
    ring: Mutex<VecDeque<EventEnvelope>>,
}

/// An unbounded pub/sub bus of [`EventEnvelope`]s (spec §4.3).
#[derive(Clone)]
pub struct EventQueue {
    inner: std::sync::Arc<EventQueueInner>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            inner: std::sync::Arc::new(EventQueueInner {
                listeners: DashMap::new(),
                listener_ids: AtomicCounter::new(),
                retention,
                ring: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Delivers `envelope` to every currently-registered listener and
    /// appends it to the replay ring. A listener that panics is caught,
    /// logged, and does not prevent delivery to the remaining listeners or
    /// affect `emit`'s own return.
    pub fn emit(&self, envelope: EventEnvelope) {
        for entry in self.inner.listeners.iter() {
            let listener = entry.value();
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener(&envelope)));
            if let Err(panic) = result {
                warn!(listener_id = *entry.key(), ?panic, "event listener panicked");
            }
        }

        let mut ring = self.inner.ring.lock().expect("event ring lock poisoned");
        ring.push_back(envelope);
        while ring.len() > self.inner.retention {
            ring.pop_front();
        }
    }

    /// Registers `listener` for every event, in any per-listener order that
    /// matches emit order.
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        let id = self.inner.listener_ids.next();
        self.inner.listeners.insert(id, Box::new(listener));
        Unsubscribe {
            id,
            queue: std::sync::Arc::clone(&self.inner),
        }
    }

    /// Registers `listener` for events whose kind equals `kind` only.
    pub fn subscribe_typed<F>(&self, kind: EventKind, listener: F) -> Unsubscribe
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        self.subscribe(move |envelope| {
            if envelope.event.kind() == kind {
                listener(envelope);
            }
        })
    }

    /// Registers `listener` for events correlated to `submission_id` only.
    pub fn subscribe_correlated<F>(&self, submission_id: SubmissionId, listener: F) -> Unsubscribe
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        self.subscribe(move |envelope| {
            if envelope.submission_id.as_ref() == Some(&submission_id) {
                listener(envelope);
            }
        })
    }

    /// Returns up to the last `n` envelopes from the replay ring.
    pub fn get_recent(&self, n: usize) -> Vec<EventEnvelope> {
        let ring = self.inner.ring.lock().expect("event ring lock poisoned");
        let start = ring.len().saturating_sub(n);
        ring.iter().skip(start).cloned().collect()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "event.test.rs"]
mod tests;
