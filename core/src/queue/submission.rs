//! Bounded FIFO submission queue with producer backpressure (spec §4.2, C2).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

use super::error::Result;
use super::error::queue_error::ClosedSnafu;
use super::error::queue_error::TimeoutSnafu;
use crate::ids::AtomicCounter;
use crate::protocol::Operation;
use crate::protocol::Submission;
use crate::protocol::SubmissionId;

/// Default queue capacity (spec §4.2).
pub const DEFAULT_CAPACITY: usize = 64;

/// Configuration for a [`SubmissionQueue`].
#[derive(Debug, Clone, Copy)]
pub struct SubmissionQueueConfig {
    pub capacity: usize,
    /// How long a blocked `submit()` waits for a free slot before failing
    /// with [`super::error::QueueError::Timeout`]. `None` waits forever.
    pub submit_timeout: Option<Duration>,
}

impl Default for SubmissionQueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            submit_timeout: None,
        }
    }
}

/// A bounded FIFO of [`Submission`]s (spec §4.2).
///
/// Producers suspend on `submit()` when full; consumers suspend on `take()`
/// when empty. `close()` is idempotent and wakes every waiter.
pub struct SubmissionQueue {
    config: SubmissionQueueConfig,
    inner: Mutex<VecDeque<Submission>>,
    closed: AtomicBool,
    not_full: Notify,
    not_empty: Notify,
    ids: AtomicCounter,
}

impl SubmissionQueue {
    pub fn new(config: SubmissionQueueConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            not_full: Notify::new(),
            not_empty: Notify::new(),
            ids: AtomicCounter::new(),
        }
    }

    /// Enqueues `op`, suspending the caller while the queue is full.
    pub async fn submit(
        &self,
        op: Operation,
        correlation_id: Option<SubmissionId>,
    ) -> Result<SubmissionId> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return ClosedSnafu.fail();
            }
            {
                let mut guard = self.inner.lock().expect("submission queue lock poisoned");
                if guard.len() < self.config.capacity {
                    let id = SubmissionId::from_counter(&self.ids);
                    guard.push_back(Submission {
                        id: id.clone(),
                        op,
                        timestamp: chrono::Utc::now(),
                        correlation_id,
                    });
                    drop(guard);
                    self.not_empty.notify_one();
                    return Ok(id);
                }
            }
            let notified = self.not_full.notified();
            match self.config.submit_timeout {
                Some(d) => {
                    if tokio::time::timeout(d, notified).await.is_err() {
                        return TimeoutSnafu.fail();
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Returns the next submission, suspending while the queue is empty.
    /// Returns `None` iff the queue is closed and empty.
    pub async fn take(&self) -> Option<Submission> {
        loop {
            {
                let mut guard = self.inner.lock().expect("submission queue lock poisoned");
                if let Some(item) = guard.pop_front() {
                    drop(guard);
                    self.not_full.notify_one();
                    return Some(item);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.not_empty.notified().await;
        }
    }

    /// Non-blocking variant of [`Self::take`].
    pub fn try_take(&self) -> Option<Submission> {
        let mut guard = self.inner.lock().expect("submission queue lock poisoned");
        let item = guard.pop_front();
        drop(guard);
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Idempotently closes the queue, waking every producer and consumer.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("submission queue closed");
        self.not_full.notify_waiters();
        self.not_empty.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("submission queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns an async stream of submissions that yields until the queue
/// closes and drains.
pub fn into_stream(
    queue: std::sync::Arc<SubmissionQueue>,
) -> impl futures::Stream<Item = Submission> {
    futures::stream::unfold(queue, |queue| async move {
        let item = queue.take().await?;
        Some((item, queue))
    })
}

#[cfg(test)]
#[path = "submission.test.rs"]
mod tests;
