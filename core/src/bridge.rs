//! Protocol bridge: binds a submission queue, an event queue, and a
//! registered operation handler (spec §4.4, C4).

use std::sync::Arc;
use std::sync::Mutex;

use agent_error::ErrorExt;
use agent_error::Location;
use agent_error::StatusCode;
use agent_error::fmt_error_chain;
use futures::future::BoxFuture;
use snafu::Snafu;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing::info_span;
use tracing::warn;

use crate::ids::AtomicCounter;
use crate::protocol::AgentEvent;
use crate::protocol::EventEnvelope;
use crate::protocol::EventId;
use crate::protocol::Submission;
use crate::protocol::SubmissionId;
use crate::queue::EventQueue;
use crate::queue::SubmissionQueue;

#[derive(Snafu)]
#[snafu(visibility(pub(crate)), module)]
pub enum BridgeError {
    #[snafu(display("protocol bridge is already running"))]
    AlreadyRunning {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("protocol bridge has not been started"))]
    NotStarted {
        #[snafu(implicit)]
        location: Location,
    },
}

impl std::fmt::Debug for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_error_chain(self, f)
    }
}

impl ErrorExt for BridgeError {
    fn status_code(&self) -> StatusCode {
        StatusCode::InvariantViolation
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// An async operation handler registered with a [`ProtocolBridge`].
pub type SubmissionHandler =
    Arc<dyn Fn(Submission) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Default cap on how many submissions may have their handler running
/// concurrently when none is given explicitly.
const DEFAULT_MAX_CONCURRENT_SUBMISSIONS: usize = 8;

struct Running {
    q_out: Arc<EventQueue>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Binds one [`SubmissionQueue`] and one [`EventQueue`], dispatching every
/// submission taken from the former to a registered handler and wrapping
/// handler failures as error events on the latter (spec §4.4). Each
/// submission's handler runs in its own task, bounded by a semaphore, so
/// slow submissions don't head-of-line block the ones behind them.
pub struct ProtocolBridge {
    handler: SubmissionHandler,
    event_ids: AtomicCounter,
    running: Mutex<Option<Running>>,
    semaphore: Arc<Semaphore>,
}

impl ProtocolBridge {
    pub fn new(handler: SubmissionHandler) -> Arc<Self> {
        Self::with_max_concurrent_submissions(handler, DEFAULT_MAX_CONCURRENT_SUBMISSIONS)
    }

    /// Like [`Self::new`], but with an explicit cap on concurrently-running
    /// handler invocations.
    pub fn with_max_concurrent_submissions(handler: SubmissionHandler, max_concurrent_submissions: usize) -> Arc<Self> {
        Arc::new(Self {
            handler,
            event_ids: AtomicCounter::new(),
            running: Mutex::new(None),
            semaphore: Arc::new(Semaphore::new(max_concurrent_submissions)),
        })
    }

    /// Spawns a consumer task that repeatedly `take()`s from `q_in` and
    /// spawns the handler for each submission as its own task, so one
    /// submission's handler never blocks the next submission from starting.
    /// Fails if already running.
    pub fn start(self: &Arc<Self>, q_in: Arc<SubmissionQueue>, q_out: Arc<EventQueue>) -> Result<()> {
        let mut guard = self.running.lock().expect("bridge lock poisoned");
        if guard.is_some() {
            return bridge_error::AlreadyRunningSnafu.fail();
        }

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let this = Arc::clone(self);
        let q_out_task = Arc::clone(&q_out);
        let semaphore = Arc::clone(&self.semaphore);

        let join = tokio::spawn(async move {
            let mut handler_tasks = JoinSet::new();
            loop {
                let submission = tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    maybe = q_in.take() => match maybe {
                        Some(submission) => submission,
                        None => break,
                    },
                };
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let this = Arc::clone(&this);
                let q_out_task = Arc::clone(&q_out_task);
                handler_tasks.spawn(async move {
                    let _permit = permit;
                    this.dispatch(&q_out_task, submission).await;
                });
            }
            while handler_tasks.join_next().await.is_some() {}
        });

        *guard = Some(Running { q_out, cancel, join });
        Ok(())
    }

    async fn dispatch(&self, q_out: &Arc<EventQueue>, submission: Submission) {
        let submission_id = submission.id.clone();
        let span = info_span!("dispatch_submission", submission_id = %submission_id);
        let result = (self.handler)(submission).instrument(span).await;
        if let Err(err) = result {
            warn!(%submission_id, error = %err, "operation handler failed");
            self.publish(
                q_out,
                Some(submission_id),
                AgentEvent::Error {
                    code: "OPERATION_HANDLER_ERROR".to_string(),
                    message: err.to_string(),
                    recoverable: true,
                    stack: Some(format!("{err:?}")),
                },
            );
        }
    }

    fn publish(&self, q_out: &Arc<EventQueue>, submission_id: Option<SubmissionId>, event: AgentEvent) {
        q_out.emit(EventEnvelope {
            event_id: EventId::from_counter(&self.event_ids),
            submission_id,
            timestamp: chrono::Utc::now(),
            event,
        });
    }

    /// Emits `event` correlated to `submission_id`. Fails if not started.
    pub fn emit(&self, submission_id: Option<SubmissionId>, event: AgentEvent) -> Result<()> {
        let guard = self.running.lock().expect("bridge lock poisoned");
        let running = guard.as_ref().ok_or_else(|| {
            bridge_error::NotStartedSnafu.build()
        })?;
        let q_out = Arc::clone(&running.q_out);
        drop(guard);
        self.publish(&q_out, submission_id, event);
        Ok(())
    }

    /// Requests the consumer task stop pulling new submissions. In-flight
    /// handler tasks keep running; [`Self::wait_for_stop`] drains them.
    /// Idempotent.
    pub fn stop(&self) {
        let guard = self.running.lock().expect("bridge lock poisoned");
        if let Some(running) = guard.as_ref() {
            running.cancel.cancel();
        }
    }

    /// Resolves once the consumer task started by [`Self::start`] and every
    /// in-flight handler task it spawned have fully exited. After this
    /// returns, [`Self::start`] may be called again with fresh queues.
    pub async fn wait_for_stop(&self) {
        let running = {
            let mut guard = self.running.lock().expect("bridge lock poisoned");
            guard.take()
        };
        if let Some(running) = running {
            running.cancel.cancel();
            let _ = running.join.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().expect("bridge lock poisoned").is_some()
    }
}

#[cfg(test)]
#[path = "bridge.test.rs"]
mod tests;
